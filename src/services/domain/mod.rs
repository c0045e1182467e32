/// 领域服务层模块
/// 包含测试站的核心业务逻辑

/// 测试流程编排 - 顺序启动测试、汇总结论、管理作业日志
pub mod procedure;

/// 测试任务 - 单个测试步骤的执行与状态机
pub mod test_task;

/// 标准测试步骤 - 夹具检验、引擎自检步骤、人工判定
pub mod standard_test_steps;

/// 设备注册表 - 按顺序连接/断开测试设备
pub mod equipment_registry;

// 重新导出常用类型
pub use procedure::{Procedure, ProcedureBuilder, StepFactory, PASS_SUMMARY, FAIL_SUMMARY, MANUAL_FAILURE};
pub use test_task::{ITestStep, StepContext, StepVerdict, TaskKind, TestTask};
pub use standard_test_steps::{
    Verify, PassTest, FailTest, FailContinueTest, UserTest, ScanUnitIdTest,
};
pub use equipment_registry::EquipmentRegistry;
