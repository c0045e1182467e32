/// 标准测试步骤
///
/// 夹具检验、确定结果的引擎自检步骤、人工判定步骤和扫码步骤。
/// 具体产品的测试流程由这些步骤和产品专用步骤组合而成。

use crate::models::{BilingualText, UserVerdict};
use crate::services::domain::test_task::{ITestStep, StepContext, StepVerdict};
use crate::utils::error::AppResult;
use async_trait::async_trait;
use std::time::Duration;
use log::{debug, info};

/// 夹具检验
///
/// 作业开始前单独运行，不属于测试序列。等待电源稳定后给出预设的结论。
pub struct Verify {
    name: BilingualText,
    pass_test: bool,
    settle_time: Duration,
}

impl Verify {
    pub const ID: &'static str = "verify";

    pub fn new(pass_test: bool) -> Self {
        Self {
            name: BilingualText::new("Verify Fixture", "夹具检验"),
            pass_test,
            settle_time: Duration::from_secs(1),
        }
    }

    /// 电源稳定等待时间
    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }
}

impl Default for Verify {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ITestStep for Verify {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &BilingualText {
        &self.name
    }

    fn expected_duration(&self) -> Duration {
        self.settle_time
    }

    async fn execute(&self, ctx: &mut StepContext) -> AppResult<StepVerdict> {
        ctx.sleep(self.settle_time).await;
        ctx.set_message(BilingualText::same("Demo Commissioning Test PASS"));
        if self.pass_test {
            Ok(StepVerdict::Pass)
        } else {
            Ok(StepVerdict::fail_continue(""))
        }
    }
}

/// 总是通过
pub struct PassTest {
    name: BilingualText,
    delay: Duration,
}

impl PassTest {
    pub fn new() -> Self {
        Self {
            name: BilingualText::new("Pass Test", "通过测试"),
            delay: Duration::from_millis(100),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for PassTest {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ITestStep for PassTest {
    fn id(&self) -> &str {
        "passtest"
    }

    fn name(&self) -> &BilingualText {
        &self.name
    }

    fn expected_duration(&self) -> Duration {
        Duration::from_millis(100)
    }

    async fn execute(&self, ctx: &mut StepContext) -> AppResult<StepVerdict> {
        ctx.sleep(self.delay).await;
        Ok(StepVerdict::Pass)
    }
}

/// 总是失败并终止作业
pub struct FailTest {
    name: BilingualText,
    delay: Duration,
}

impl FailTest {
    pub fn new() -> Self {
        Self {
            name: BilingualText::new("Fail Test", "未通过测试"),
            delay: Duration::from_secs(1),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for FailTest {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ITestStep for FailTest {
    fn id(&self) -> &str {
        "failtest"
    }

    fn name(&self) -> &BilingualText {
        &self.name
    }

    fn expected_duration(&self) -> Duration {
        Duration::from_millis(100)
    }

    async fn execute(&self, ctx: &mut StepContext) -> AppResult<StepVerdict> {
        ctx.sleep(self.delay).await;
        Ok(StepVerdict::fail(""))
    }
}

/// 失败但不终止作业，后续测试继续执行，汇总结论仍为失败
pub struct FailContinueTest {
    name: BilingualText,
    delay: Duration,
}

impl FailContinueTest {
    pub fn new() -> Self {
        Self {
            name: BilingualText::new("Fail Continuation Test", "无法继续测试"),
            delay: Duration::from_millis(100),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for FailContinueTest {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ITestStep for FailContinueTest {
    fn id(&self) -> &str {
        "failcontinuetest"
    }

    fn name(&self) -> &BilingualText {
        &self.name
    }

    fn expected_duration(&self) -> Duration {
        Duration::from_millis(100)
    }

    async fn execute(&self, ctx: &mut StepContext) -> AppResult<StepVerdict> {
        ctx.sleep(self.delay).await;
        Ok(StepVerdict::fail_continue("Failed test"))
    }
}

/// 人工判定
///
/// 向显示层发出判定请求后挂起，直到操作员回复（或回复句柄被丢弃）。
/// 作业被停止也不会打断等待，当前测试总是自然结束。
pub struct UserTest {
    name: BilingualText,
}

impl UserTest {
    pub fn new() -> Self {
        Self {
            name: BilingualText::new("User Test", "用户测试"),
        }
    }
}

impl Default for UserTest {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ITestStep for UserTest {
    fn id(&self) -> &str {
        "user"
    }

    fn name(&self) -> &BilingualText {
        &self.name
    }

    async fn execute(&self, ctx: &mut StepContext) -> AppResult<StepVerdict> {
        let prompt = BilingualText::new(
            "Manually choose whether product passes or fails.",
            "手动选择产品是通过还是失败",
        );
        ctx.set_message(prompt.clone());

        match ctx.request_user_verdict(prompt).await {
            UserVerdict::Pass => Ok(StepVerdict::Pass),
            UserVerdict::Fail => Ok(StepVerdict::fail_continue("")),
        }
    }
}

/// 扫描被测单元ID
///
/// 部件配置中有 `uid` 参数时直接使用，否则由模拟扫码枪生成一个序列号。
/// 拿到单元ID后之前缓存的作业日志随即落盘。
pub struct ScanUnitIdTest {
    name: BilingualText,
}

impl ScanUnitIdTest {
    pub const UNIT_ID_KEY: &'static str = "uid";

    pub fn new() -> Self {
        Self {
            name: BilingualText::new("Scan Unit ID", "扫描产品序列号"),
        }
    }
}

impl Default for ScanUnitIdTest {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ITestStep for ScanUnitIdTest {
    fn id(&self) -> &str {
        "scanuid"
    }

    fn name(&self) -> &BilingualText {
        &self.name
    }

    fn expected_duration(&self) -> Duration {
        Duration::from_millis(100)
    }

    async fn execute(&self, ctx: &mut StepContext) -> AppResult<StepVerdict> {
        let unit_id = match ctx.param(Self::UNIT_ID_KEY) {
            Some(uid) => uid,
            None => {
                if let Some(reader) = ctx.equipment("barcode") {
                    let reader = reader.lock().await;
                    if !reader.is_connected() {
                        return Ok(StepVerdict::fail(format!("{} is not connected", reader.name())));
                    }
                    debug!("[ScanUnitId] 使用 {} 扫码", reader.name());
                }
                let serial = uuid::Uuid::new_v4().simple().to_string();
                format!("SIM{}", serial[..8].to_uppercase())
            }
        };

        if unit_id.trim().is_empty() {
            return Ok(StepVerdict::fail("Unit ID scan failed"));
        }

        info!("[ScanUnitId] 单元ID: {}", unit_id);
        ctx.set_unit_id(&unit_id);
        ctx.set_data(unit_id);
        Ok(StepVerdict::Pass)
    }
}
