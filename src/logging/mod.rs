//! # 日志记录模块 (Logging Module)
//!
//! ## 业务说明
//! 本模块包含两类日志：
//! - **诊断日志**: 通过 `log` 门面输出到控制台/文件，用于排查测试站自身的问题
//! - **单元测试日志**: 每个被测单元一份的测试记录，由 [`UnitLogWriter`] 缓存并落盘
//!
//! ## 日志策略
//! - **设备日志**: 记录设备连接、断开和连接失败
//! - **测试日志**: 记录测试状态变化、失败原因与异常堆栈
//! - **操作日志**: 记录操作员的开始作业、人工判定等操作

pub mod logger_config;
pub mod simple_logger;
pub mod unit_log_writer;

pub use logger_config::*;
pub use simple_logger::{init_logger, SimpleLogger};
pub use unit_log_writer::UnitLogWriter;

/// 记录设备连接失败日志
#[macro_export]
macro_rules! log_equipment_failure {
    ($msg:expr) => {
        log::error!("[设备失败] {}", $msg);
    };
    ($msg:expr, $($arg:tt)*) => {
        log::error!("[设备失败] {}", format!($msg, $($arg)*));
    };
}

/// 记录测试执行失败日志
#[macro_export]
macro_rules! log_test_failure {
    ($msg:expr) => {
        log::error!("[测试执行失败] {}", $msg);
    };
    ($msg:expr, $($arg:tt)*) => {
        log::error!("[测试执行失败] {}", format!($msg, $($arg)*));
    };
}

/// 记录用户操作日志
#[macro_export]
macro_rules! log_user_operation {
    ($msg:expr) => {
        log::info!("[用户操作] {}", $msg);
    };
    ($msg:expr, $($arg:tt)*) => {
        log::info!("[用户操作] {}", format!($msg, $($arg)*));
    };
}
