/// 测试流程编排
///
/// 一个 `Procedure` 对应一个部件号的测试流程：有序且不可变的测试步骤工厂、
/// 设备注册表、作业日志以及作业范围的运行状态。
///
/// 序列推进规则：
/// - 第 N+1 个测试只在第 N 个测试的终态回调中启动，因此同一时刻最多一个测试在运行
/// - `stop()` 不打断当前测试，只截断后续序列并把结论置为失败
/// - 序列结束时强制落盘汇总行，并发布 `ProcedureCompleted`

use crate::models::{SequenceState, TaskState, TestInfo};
use crate::logging::UnitLogWriter;
use crate::services::domain::equipment_registry::EquipmentRegistry;
use crate::services::domain::standard_test_steps::Verify;
use crate::services::domain::test_task::{install_panic_backtrace_hook, ITestStep, TaskKind, TestTask};
use crate::services::infrastructure::event_bridge::{EventBridge, StationEvent};
use crate::utils::config::{PartConfig, StationSettings};
use crate::utils::error::{AppError, AppResult, EquipmentFailure};
use std::backtrace::Backtrace;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use log::{debug, error, info, warn};

pub const PASS_SUMMARY: &str = "PASS: All automated tests passed!";
pub const FAIL_SUMMARY: &str = "FAIL: There were automated test failures!";
pub const MANUAL_FAILURE: &str = "FAIL: Manual test failure!";

const EXCEPTION_DELIMITER_WIDTH: usize = 71;

/// 测试步骤工厂：每次执行都创建新的步骤实例
pub type StepFactory = Arc<dyn Fn() -> Box<dyn ITestStep> + Send + Sync>;

fn factory<F, S>(f: F) -> StepFactory
where
    F: Fn() -> S + Send + Sync + 'static,
    S: ITestStep + 'static,
{
    Arc::new(move || Box::new(f()) as Box<dyn ITestStep>)
}

/// 作业范围的运行状态
#[derive(Debug)]
struct RunState {
    sequence: SequenceState,
    /// 允许启动的测试序号上界（不含）
    end: usize,
    no_failures: bool,
    cancel: CancellationToken,
    run_id: Option<Uuid>,
}

impl RunState {
    fn idle() -> Self {
        Self {
            sequence: SequenceState::Idle,
            end: 0,
            no_failures: true,
            cancel: CancellationToken::new(),
            run_id: None,
        }
    }

    fn fresh(step_count: usize) -> Self {
        Self {
            end: step_count,
            run_id: Some(Uuid::new_v4()),
            ..Self::idle()
        }
    }
}

struct ProcedureInner {
    title: String,
    version: String,
    steps: Vec<StepFactory>,
    verify_step: StepFactory,
    equipment: EquipmentRegistry,
    bridge: EventBridge,
    part_config: RwLock<PartConfig>,
    log_writer: Mutex<UnitLogWriter>,
    run: Mutex<RunState>,
}

/// 测试流程句柄，克隆后共享同一份状态
#[derive(Clone)]
pub struct Procedure {
    inner: Arc<ProcedureInner>,
}

/// 测试流程构建器
pub struct ProcedureBuilder {
    title: String,
    version: Option<String>,
    part_config: PartConfig,
    bridge: EventBridge,
    equipment: EquipmentRegistry,
    log_root: PathBuf,
    steps: Vec<StepFactory>,
    verify_step: StepFactory,
}

impl ProcedureBuilder {
    pub fn new(title: impl Into<String>, part_config: PartConfig, bridge: EventBridge) -> Self {
        Self {
            title: title.into(),
            version: None,
            part_config,
            bridge,
            equipment: EquipmentRegistry::new(),
            log_root: PathBuf::from("."),
            steps: Vec::new(),
            verify_step: factory(Verify::default),
        }
    }

    /// 作业日志第二行记录的软件版本
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// 按测试站设置填充版本与日志根目录
    pub fn station(self, settings: &StationSettings) -> Self {
        self.version(settings.version_string()).log_root(settings.log_root.clone())
    }

    pub fn log_root(mut self, log_root: impl Into<PathBuf>) -> Self {
        self.log_root = log_root.into();
        self
    }

    /// 使用共享的设备注册表
    pub fn equipment(mut self, equipment: EquipmentRegistry) -> Self {
        self.equipment = equipment;
        self
    }

    /// 追加一个测试步骤
    pub fn step<F, S>(mut self, f: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: ITestStep + 'static,
    {
        self.steps.push(factory(f));
        self
    }

    /// 替换夹具检验步骤
    pub fn verify_step<F, S>(mut self, f: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: ITestStep + 'static,
    {
        self.verify_step = factory(f);
        self
    }

    pub fn build(self) -> AppResult<Procedure> {
        self.part_config.validate()?;
        let version = self
            .version
            .unwrap_or_else(|| StationSettings::default().version_string());
        let writer = UnitLogWriter::new(self.log_root, self.part_config.part_number());

        info!("[Procedure] 创建测试流程: {} ({} 个测试, 部件号 {})",
              self.title, self.steps.len(), self.part_config.part_number());
        install_panic_backtrace_hook();

        Ok(Procedure {
            inner: Arc::new(ProcedureInner {
                title: self.title,
                version,
                steps: self.steps,
                verify_step: self.verify_step,
                equipment: self.equipment,
                bridge: self.bridge,
                part_config: RwLock::new(self.part_config),
                log_writer: Mutex::new(writer),
                run: Mutex::new(RunState::idle()),
            }),
        })
    }
}

impl Procedure {
    pub fn builder(title: impl Into<String>, part_config: PartConfig, bridge: EventBridge) -> ProcedureBuilder {
        ProcedureBuilder::new(title, part_config, bridge)
    }

    pub fn title(&self) -> &str {
        &self.inner.title
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn equipment(&self) -> &EquipmentRegistry {
        &self.inner.equipment
    }

    pub fn part_config(&self) -> PartConfig {
        self.inner.part_config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.inner.run.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn writer(&self) -> MutexGuard<'_, UnitLogWriter> {
        self.inner.log_writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn publish(&self, event: StationEvent) {
        self.inner.bridge.publish(event);
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.run_state().cancel.clone()
    }

    /// 按顺序列出全部测试（只实例化，不执行），用于预先填充显示列表
    pub fn get_tests(&self) -> Vec<TestInfo> {
        self.inner.steps.iter().map(|f| f().info()).collect()
    }

    /// 全部测试的预计耗时之和
    pub fn expected_duration(&self) -> Duration {
        self.inner.steps.iter().map(|f| f().expected_duration()).sum()
    }

    pub fn is_passing(&self) -> bool {
        self.run_state().no_failures
    }

    pub fn sequence_state(&self) -> SequenceState {
        self.run_state().sequence
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_state().run_id
    }

    pub fn unit_id(&self) -> String {
        self.writer().unit_id().to_string()
    }

    /// 最近一次落盘的作业日志文件
    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.writer().last_file().map(|p| p.to_path_buf())
    }

    /// 写一行作业日志，落盘失败只记录诊断日志，内容留在缓存中
    pub fn log(&self, text: &str, force: bool) {
        if let Err(e) = self.writer().log(text, force) {
            error!("[Procedure] 写入作业日志失败: {}", e);
        }
    }

    /// 开始一次作业
    ///
    /// 重置作业状态，记录参数、版本和流程名，连接设备后启动第一个测试。
    /// 设备连接失败时不启动任何测试。已有作业未结束（包括连接设备和收尾阶段）时忽略本次请求。
    pub async fn test_start(&self) -> Result<(), EquipmentFailure> {
        let run_id = {
            let mut run = self.run_state();
            if run.sequence.is_busy() {
                warn!("[Procedure] 作业尚未结束 ({:?})，忽略开始作业请求", run.sequence);
                return Ok(());
            }
            *run = RunState::fresh(self.inner.steps.len());
            run.sequence = SequenceState::Starting;
            run.run_id
        };

        let part = self.part_config();
        self.writer().start_run(part.part_number());
        crate::log_user_operation!("开始作业: {} [{}]",
            self.inner.title, run_id.map(|id| id.to_string()).unwrap_or_default());

        self.log(&part.parameter_summary(), false);
        self.log(&self.inner.version, false);
        self.log(&self.inner.title, false);

        if let Err(failure) = self.connect_equipment().await {
            self.run_state().no_failures = false;
            self.log(&format!("FAIL: Equipment failure: {} - {}", failure.name, failure.message), true);
            self.run_state().sequence = SequenceState::Done;
            return Err(failure);
        }

        let first = {
            let mut run = self.run_state();
            if run.end > 0 {
                run.sequence = SequenceState::Running(0);
                Ok(0)
            } else {
                run.sequence = SequenceState::Finishing;
                Err(run.no_failures)
            }
        };

        match first {
            Ok(index) => self.spawn_test(index),
            Err(passed) => self.finish_run(passed),
        }
        Ok(())
    }

    fn spawn_test(&self, index: usize) {
        let step = (self.inner.steps[index])();
        let task = TestTask::new(self.clone(), step, TaskKind::Sequenced(index));
        debug!("[Procedure] 启动第 {} 个测试: {}", index, task.id());
        tokio::spawn(task.run());
    }

    /// 按任务种类分发状态回调
    pub(crate) fn task_callback(&self, task: &TestTask) {
        match task.kind() {
            TaskKind::Sequenced(_) => self.test_callback(task),
            TaskKind::Verify => self.verify_callback(task),
        }
    }

    /// 顺序测试的状态回调
    ///
    /// 每次状态变化都转发给显示层；终态时记录结果、更新结论并推进序列。
    /// 同一个测试的终态只推进一次序列，重复的终态回调会被忽略。
    pub fn test_callback(&self, task: &TestTask) {
        self.publish(StationEvent::TestStateChanged(task.snapshot()));
        if !task.state().is_terminal() {
            return;
        }

        let index = match task.kind() {
            TaskKind::Sequenced(i) => i,
            TaskKind::Verify => {
                warn!("[Procedure] 夹具检验不属于测试序列: {}", task.id());
                return;
            }
        };

        let next = {
            let mut run = self.run_state();
            if run.sequence.in_flight() != Some(index) {
                warn!("[Procedure] 忽略重复的终态回调: {} (序号 {}, 当前 {:?})",
                      task.id(), index, run.sequence);
                return;
            }
            if task.state() == TaskState::Fail {
                run.no_failures = false;
            }
            if index + 1 < run.end {
                run.sequence = SequenceState::Running(index + 1);
                Ok(index + 1)
            } else {
                run.sequence = SequenceState::Finishing;
                Err(run.no_failures)
            }
        };

        let mut line = format!("{}: {}", task.state(), task.name().en);
        if let Some(data) = task.data() {
            line.push_str(&format!(", data: {}", data));
        }
        self.log(&line, false);

        match next {
            Ok(i) => self.spawn_test(i),
            Err(passed) => self.finish_run(passed),
        }
    }

    /// 收尾：写入汇总结论后才允许开始下一次作业
    ///
    /// `passed` 是进入收尾阶段时锁内读取的结论，之后的手动判定或停止不会改变本次汇总。
    fn finish_run(&self, passed: bool) {
        self.log(if passed { PASS_SUMMARY } else { FAIL_SUMMARY }, true);
        self.run_state().sequence = SequenceState::Done;
        info!("{} [Procedure] 作业结束: {}", if passed { "✅" } else { "❌" }, self.inner.title);
        self.publish(StationEvent::ProcedureCompleted { passed });
    }

    /// 停止作业：当前测试自然结束，之后不再启动任何测试，结论强制为失败
    pub fn stop(&self) {
        let mut run = self.run_state();
        run.no_failures = false;
        run.cancel.cancel();
        match run.sequence {
            SequenceState::Running(i) | SequenceState::Draining(i) => {
                run.end = run.end.min(i + 1);
                run.sequence = SequenceState::Draining(i);
            }
            SequenceState::Idle
            | SequenceState::Starting
            | SequenceState::Finishing
            | SequenceState::Done => run.end = 0,
        }
        info!("[Procedure] 停止作业: {:?}", run.sequence);
    }

    /// 运行夹具检验，不属于测试序列，返回检验任务的句柄
    pub async fn verify_start(&self) -> Result<JoinHandle<()>, EquipmentFailure> {
        self.connect_equipment().await?;
        {
            let mut run = self.run_state();
            if !run.sequence.is_busy() && run.cancel.is_cancelled() {
                run.cancel = CancellationToken::new();
            }
        }
        let task = TestTask::new(self.clone(), (self.inner.verify_step)(), TaskKind::Verify);
        info!("[Procedure] 开始夹具检验: {}", task.name());
        Ok(tokio::spawn(task.run()))
    }

    /// 夹具检验的状态回调，只转发给显示层
    pub fn verify_callback(&self, task: &TestTask) {
        self.publish(StationEvent::VerifyStateChanged(task.snapshot()));
        if task.state().is_terminal() {
            info!("[Procedure] 夹具检验结束: {} - {}", task.name(), task.state());
        }
    }

    /// 连接全部设备，遇到第一个失败立即返回
    pub async fn connect_equipment(&self) -> Result<(), EquipmentFailure> {
        self.inner.equipment.connect_all().await
    }

    /// 断开全部设备，错误只记录日志
    pub async fn disconnect_equipment(&self) {
        self.inner.equipment.disconnect_all().await;
    }

    /// 测试体出现意外错误
    ///
    /// 记录错误与堆栈，把任务置为失败并停止作业，然后补发一次终态回调。
    /// 测试体panic时 `backtrace` 是panic钩子在出错位置记录的堆栈；
    /// 测试体返回 `Err` 时错误已沿调用链传回，这里记录的堆栈只反映上报位置。
    pub fn thread_exception(&self, task: &mut TestTask, error: &AppError, backtrace: Option<String>) {
        crate::log_test_failure!("{} 执行异常: {}", task.id(), error);
        let backtrace = backtrace.unwrap_or_else(|| Backtrace::force_capture().to_string());
        let delimiter = "-".repeat(EXCEPTION_DELIMITER_WIDTH);

        self.log(&delimiter, false);
        self.log(&format!("Thread Exception in {}!", task.name().en), false);
        self.log(&format!("{}\n{}", error, backtrace), false);
        self.log(&delimiter, false);

        task.force_fail();
        self.stop();
        self.publish(StationEvent::TestError {
            test_name: task.name().clone(),
            message: error.to_string(),
        });
        self.task_callback(task);
    }

    /// 操作员手动判定失败
    pub fn manual_failure(&self) {
        self.run_state().no_failures = false;
        crate::log_user_operation!("手动判定失败: {}", self.inner.title);
        self.log(MANUAL_FAILURE, false);
    }

    /// 记录被测单元ID，之前缓存的作业日志随即落盘
    pub fn set_unit_id(&self, unit_id: &str) {
        let mut writer = self.writer();
        writer.set_unit_id(unit_id);
        if let Err(e) = writer.flush() {
            error!("[Procedure] 写入作业日志失败: {}", e);
        }
    }

    /// 替换部件配置，下次作业开始时生效
    pub fn update_config(&self, part_config: PartConfig) -> AppResult<()> {
        part_config.validate()?;
        info!("[Procedure] 更新部件配置: {}", part_config.name);
        *self.inner.part_config.write().unwrap_or_else(|e| e.into_inner()) = part_config;
        Ok(())
    }

    /// 操作员结束作业
    pub fn end_job(&self) {
        crate::log_user_operation!("结束作业: {}", self.inner.title);
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::domain::standard_test_steps::{FailContinueTest, PassTest, UserTest};

    fn part() -> PartConfig {
        PartConfig::new("demo").with_var("partnum", "PN-1")
    }

    #[test]
    fn test_build_rejects_part_without_number() {
        let (bridge, _rx) = EventBridge::new();
        let result = Procedure::builder("Demo", PartConfig::new("empty"), bridge).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_get_tests_has_no_side_effects() {
        let (bridge, _rx) = EventBridge::new();
        let procedure = Procedure::builder("Demo", part(), bridge)
            .step(PassTest::new)
            .step(FailContinueTest::new)
            .step(UserTest::new)
            .build()
            .unwrap();

        let ids: Vec<_> = procedure.get_tests().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["passtest", "failcontinuetest", "user"]);
        assert_eq!(procedure.expected_duration(), Duration::from_millis(200));
        assert_eq!(procedure.sequence_state(), SequenceState::Idle);
        assert!(procedure.is_passing());
        assert!(procedure.run_id().is_none());
    }

    #[test]
    fn test_stop_when_idle_forces_failure() {
        let (bridge, _rx) = EventBridge::new();
        let procedure = Procedure::builder("Demo", part(), bridge).build().unwrap();
        procedure.stop();
        assert!(!procedure.is_passing());
        assert_eq!(procedure.sequence_state(), SequenceState::Idle);
    }

    #[tokio::test]
    async fn test_start_ignored_until_summary_written() {
        let dir = tempfile::TempDir::new().unwrap();
        let (bridge, _rx) = EventBridge::new();
        let procedure = Procedure::builder("Demo", part(), bridge)
            .log_root(dir.path())
            .step(PassTest::new)
            .build()
            .unwrap();

        let finishing = Some(Uuid::new_v4());
        {
            let mut run = procedure.run_state();
            run.sequence = SequenceState::Finishing;
            run.run_id = finishing;
        }
        assert!(procedure.test_start().await.is_ok());
        assert_eq!(procedure.run_id(), finishing);
        assert_eq!(procedure.sequence_state(), SequenceState::Finishing);

        procedure.finish_run(true);
        assert_eq!(procedure.sequence_state(), SequenceState::Done);
        assert!(procedure.log_file_path().is_some());
    }

    #[test]
    fn test_stop_while_starting_truncates_sequence() {
        let (bridge, _rx) = EventBridge::new();
        let procedure = Procedure::builder("Demo", part(), bridge)
            .step(PassTest::new)
            .build()
            .unwrap();
        {
            let mut run = procedure.run_state();
            *run = RunState::fresh(1);
            run.sequence = SequenceState::Starting;
        }
        procedure.stop();
        let run = procedure.run_state();
        assert_eq!(run.sequence, SequenceState::Starting);
        assert_eq!(run.end, 0);
        assert!(!run.no_failures);
    }

    #[test]
    fn test_update_config_validates() {
        let (bridge, _rx) = EventBridge::new();
        let procedure = Procedure::builder("Demo", part(), bridge).build().unwrap();
        assert!(procedure.update_config(PartConfig::new("bad")).is_err());
        assert!(procedure
            .update_config(PartConfig::new("next").with_var("partnum", "PN-2"))
            .is_ok());
        assert_eq!(procedure.part_config().part_number(), "PN-2");
    }

    #[test]
    fn test_manual_failure_marks_verdict() {
        let (bridge, _rx) = EventBridge::new();
        let procedure = Procedure::builder("Demo", part(), bridge).build().unwrap();
        procedure.manual_failure();
        assert!(!procedure.is_passing());
    }
}
