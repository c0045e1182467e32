//! 日志配置模块
//!
//! 诊断日志的级别与输出目标。单元测试日志（每个被测单元一个文件）见 `unit_log_writer`。

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use crate::utils::config::LoggingConfig;
use crate::utils::error::AppError;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 日志输出目标
    pub targets: Vec<LogTarget>,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(AppError::configuration_error(format!("无效的日志级别: {}", other))),
        }
    }
}

/// 日志输出目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogTarget {
    Console,
    File { path: PathBuf },
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            targets: vec![LogTarget::Console],
        }
    }
}

impl LoggerConfig {
    /// 是否需要写文件
    pub fn has_file_target(&self) -> bool {
        self.targets.iter().any(|t| matches!(t, LogTarget::File { .. }))
    }
}

impl TryFrom<&LoggingConfig> for LoggerConfig {
    type Error = AppError;

    fn try_from(config: &LoggingConfig) -> Result<Self, Self::Error> {
        let mut targets = Vec::new();
        if config.console_output {
            targets.push(LogTarget::Console);
        }
        if let Some(path) = &config.log_file_path {
            targets.push(LogTarget::File { path: path.clone() });
        }
        Ok(Self {
            level: config.log_level.parse()?,
            targets,
        })
    }
}
