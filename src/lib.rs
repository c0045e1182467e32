/// 生产测试站 - 测试流程执行引擎核心库
pub mod models;
pub mod utils;
pub mod logging;
pub mod services;
pub mod procedures;
pub mod interfaces;
pub mod station;

// 重新导出常用类型，方便使用
pub use models::*;
pub use utils::{AppError, AppResult, AppConfig, EquipmentFailure, PartConfig};
pub use services::*;
pub use station::{run, StationOptions};
