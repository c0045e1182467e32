/// 测试任务
///
/// 一个测试任务 = 一个测试步骤（`ITestStep`）+ 运行时状态。
/// 每个任务在独立的 tokio 任务中执行，执行前后各调用一次测试流程的回调，
/// 失败的判定、异常的吸收都在这里完成，测试体只需要返回结论。

use crate::models::{BilingualText, TaskState, TaskUpdate, TestInfo, UserVerdict};
use crate::services::domain::procedure::Procedure;
use crate::services::infrastructure::event_bridge::{PassFailQuery, StationEvent, UserResponder};
use crate::services::traits::SharedEquipment;
use crate::utils::error::{AppError, AppResult};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use log::{debug, info, warn};

/// 测试体的结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepVerdict {
    Pass,
    /// `exit_run` 为真时同时终止后续测试
    Fail { message: String, exit_run: bool },
}

impl StepVerdict {
    /// 失败并终止作业
    pub fn fail(message: impl Into<String>) -> Self {
        StepVerdict::Fail {
            message: message.into(),
            exit_run: true,
        }
    }

    /// 失败但继续执行后续测试
    pub fn fail_continue(message: impl Into<String>) -> Self {
        StepVerdict::Fail {
            message: message.into(),
            exit_run: false,
        }
    }
}

/// 测试步骤接口
///
/// 每次作业都会通过工厂重新创建步骤实例，步骤可以持有自己的配置但不应保留跨作业的状态。
#[async_trait]
pub trait ITestStep: Send + Sync {
    /// 稳定的测试ID
    fn id(&self) -> &str;

    /// 双语显示名
    fn name(&self) -> &BilingualText;

    /// 预计耗时
    fn expected_duration(&self) -> Duration {
        Duration::ZERO
    }

    /// 测试体
    ///
    /// 返回 `Err` 或发生 panic 时按异常处理：记录堆栈、判失败并终止作业。
    async fn execute(&self, ctx: &mut StepContext) -> AppResult<StepVerdict>;

    fn info(&self) -> TestInfo {
        TestInfo {
            id: self.id().to_string(),
            name: self.name().clone(),
            expected_duration: self.expected_duration(),
        }
    }
}

/// 任务种类：顺序测试还是夹具检验
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Sequenced(usize),
    Verify,
}

/// 测试体可以访问的运行环境
pub struct StepContext {
    procedure: Procedure,
    test_id: String,
    name: BilingualText,
    cancel: CancellationToken,
    message: Option<BilingualText>,
    data: Option<String>,
}

impl StepContext {
    fn new(procedure: Procedure, test_id: String, name: BilingualText) -> Self {
        let cancel = procedure.cancellation_token();
        Self {
            procedure,
            test_id,
            name,
            cancel,
            message: None,
            data: None,
        }
    }

    /// 写一行作业日志
    pub fn log(&self, text: &str) {
        self.procedure.log(text, false);
    }

    /// 读取部件配置中的参数
    pub fn param(&self, key: &str) -> Option<String> {
        self.procedure.part_config().get(key).map(str::to_string)
    }

    pub fn part_number(&self) -> String {
        self.procedure.part_config().part_number().to_string()
    }

    /// 按键获取测试设备
    pub fn equipment(&self, key: &str) -> Option<SharedEquipment> {
        self.procedure.equipment().get(key)
    }

    /// 设置被测单元ID（扫码结果），之前缓存的作业日志随即落盘
    pub fn set_unit_id(&self, unit_id: &str) {
        self.procedure.set_unit_id(unit_id);
    }

    /// 显示给操作员的提示信息
    pub fn set_message(&mut self, message: BilingualText) {
        self.message = Some(message);
    }

    /// 测量数据，随状态一起显示并写入日志
    pub fn set_data(&mut self, data: impl Into<String>) {
        self.data = Some(data.into());
    }

    /// 作业是否已被停止
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 可被 `stop()` 打断的等待，正常等满返回 `true`
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    /// 请求操作员人工判定并等待回复
    ///
    /// 显示层丢弃回复句柄而不回复时按失败处理。
    pub async fn request_user_verdict(&self, prompt: BilingualText) -> UserVerdict {
        let (responder, receiver) = UserResponder::new();
        let update = TaskUpdate {
            test_id: self.test_id.clone(),
            name: self.name.clone(),
            state: TaskState::Running,
            message: self.message.clone(),
            data: self.data.clone(),
            timestamp: chrono::Utc::now(),
        };
        self.procedure.publish(StationEvent::PassFailQuery(PassFailQuery {
            update,
            prompt,
            responder,
        }));

        match receiver.await {
            Ok(verdict) => {
                crate::log_user_operation!("{} 人工判定: {:?}", self.test_id, verdict);
                verdict
            }
            Err(_) => {
                warn!("[TestTask] {} 的人工判定请求未得到回复，按失败处理", self.test_id);
                UserVerdict::Fail
            }
        }
    }
}

/// 测试任务运行时
pub struct TestTask {
    id: String,
    name: BilingualText,
    expected_duration: Duration,
    state: TaskState,
    message: Option<BilingualText>,
    data: Option<String>,
    kind: TaskKind,
    step: Box<dyn ITestStep>,
    procedure: Procedure,
}

impl TestTask {
    pub fn new(procedure: Procedure, step: Box<dyn ITestStep>, kind: TaskKind) -> Self {
        Self {
            id: step.id().to_string(),
            name: step.name().clone(),
            expected_duration: step.expected_duration(),
            state: TaskState::Pending,
            message: None,
            data: None,
            kind,
            step,
            procedure,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &BilingualText {
        &self.name
    }

    pub fn expected_duration(&self) -> Duration {
        self.expected_duration
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn message(&self) -> Option<&BilingualText> {
        self.message.as_ref()
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> TaskUpdate {
        TaskUpdate {
            test_id: self.id.clone(),
            name: self.name.clone(),
            state: self.state,
            message: self.message.clone(),
            data: self.data.clone(),
            timestamp: chrono::Utc::now(),
        }
    }

    fn transition(&mut self, next: TaskState) -> AppResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::state_transition_error(
                self.state.to_string(),
                next.to_string(),
                format!("测试 {} 的状态不能回退", self.id),
            ));
        }
        debug!("[TestTask] {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        Ok(())
    }

    /// 判定失败
    ///
    /// 非空的 `message` 写入作业日志；`exit_run` 为真时同时停止后续测试。
    pub fn fail(&mut self, message: &str, exit_run: bool) {
        if !message.is_empty() {
            self.procedure.log(message, false);
        }
        self.force_fail();
        if exit_run {
            self.procedure.stop();
        }
    }

    /// 直接置为失败，不经过状态检查（异常路径使用）
    pub(crate) fn force_fail(&mut self) {
        self.state = TaskState::Fail;
    }

    /// 执行任务：Running 回调 → 测试体 → 终态回调
    ///
    /// 终态回调（或异常处理）恰好触发一次，测试流程依赖它推进序列。
    pub async fn run(mut self) {
        let procedure = self.procedure.clone();

        if let Err(e) = self.transition(TaskState::Running) {
            procedure.thread_exception(&mut self, &e, None);
            return;
        }
        info!("🚀 开始测试: {} [{}]", self.name, self.id);
        procedure.task_callback(&self);

        let mut ctx = StepContext::new(procedure.clone(), self.id.clone(), self.name.clone());
        let outcome = AssertUnwindSafe(self.step.execute(&mut ctx)).catch_unwind().await;
        self.message = ctx.message.take();
        self.data = ctx.data.take();

        let (result, panic_trace) = match outcome {
            Ok(result) => (result, None),
            Err(panic) => (
                Err(AppError::test_execution_error(self.id.clone(), panic_message(panic))),
                take_panic_backtrace(),
            ),
        };

        match result {
            Ok(StepVerdict::Pass) => {
                if let Err(e) = self.transition(TaskState::Pass) {
                    procedure.thread_exception(&mut self, &e, None);
                    return;
                }
            }
            Ok(StepVerdict::Fail { message, exit_run }) => self.fail(&message, exit_run),
            Err(e) => {
                procedure.thread_exception(&mut self, &e, panic_trace);
                return;
            }
        }

        info!("{} 测试完成: {} - {}",
              if self.state == TaskState::Pass { "✅" } else { "❌" },
              self.name, self.state);
        procedure.task_callback(&self);
    }
}

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// 安装记录panic堆栈的钩子
///
/// 钩子在panic发生的线程上运行，此时堆栈仍指向出错位置。只安装一次，
/// 原有钩子照常执行。
pub fn install_panic_backtrace_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            let _ = PANIC_BACKTRACE.try_with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// 取出当前线程最近一次panic时记录的堆栈
pub(crate) fn take_panic_backtrace() -> Option<String> {
    PANIC_BACKTRACE.try_with(|slot| slot.borrow_mut().take()).ok().flatten()
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知的panic".to_string()
    }
}
