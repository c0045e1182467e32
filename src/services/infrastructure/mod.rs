/// 基础设施层服务模块
/// 负责测试核心与显示层、测试设备之间的交互

/// 跨线程事件桥
pub mod event_bridge;

/// 显示层更新循环
pub mod display_loop;

/// 模拟测试设备
pub mod simulated_equipment;

// 重新导出常用接口和实现
pub use event_bridge::{EventBridge, EventReceiver, PassFailQuery, StationEvent, UserResponder};
pub use display_loop::DisplayLoop;
pub use simulated_equipment::SimulatedEquipment;
