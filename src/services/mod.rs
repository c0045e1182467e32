/// 服务层模块
///
/// - Domain Layer: 测试流程编排、测试任务、标准测试步骤、设备注册表
/// - Infrastructure Layer: 跨线程事件桥、显示循环、模拟设备

/// 领域层服务模块
pub mod domain;

/// 基础设施层服务模块
pub mod infrastructure;

/// 服务层基础trait定义
pub mod traits;

// 重新导出基础trait
pub use traits::{Equipment, IStationView, SharedEquipment};

// 重新导出领域层服务
pub use domain::{
    EquipmentRegistry, ITestStep, Procedure, ProcedureBuilder, StepContext, StepFactory,
    StepVerdict, TaskKind, TestTask,
};

// 重新导出基础设施层服务
pub use infrastructure::{
    DisplayLoop, EventBridge, EventReceiver, PassFailQuery, SimulatedEquipment, StationEvent,
    UserResponder,
};
