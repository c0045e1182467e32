use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 设备连接失败
///
/// **业务含义**: 作业开始前连接测试设备（扫码枪、电源、万用表、频谱仪等）失败。
/// 这是唯一会从 `Procedure::test_start` / `Procedure::verify_start` 返回给调用方的错误，
/// 其余测试过程中的失败都被吸收为日志 + 状态回调。
///
/// **字段**:
/// - `name`: 出错设备的名称
/// - `message`: 底层传输错误的描述
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("设备连接失败: {name} - {message}")]
pub struct EquipmentFailure {
    pub name: String,
    pub message: String,
}

impl EquipmentFailure {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// 应用程序统一错误类型
/// 用于封装系统中可能出现的各种错误，提供统一的错误处理机制
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AppError {
    /// 通用错误，包含错误消息
    #[error("通用错误: {message}")]
    Generic { message: String },

    /// 输入/输出错误
    #[error("IO错误: {message} (Kind: {kind})")]
    IoError { message: String, kind: String },

    /// 设备通信错误（连接、读写、超时等传输层问题）
    #[error("设备通信错误: {message}")]
    EquipmentCommunicationError { message: String },

    /// 设备连接失败（作业级致命错误）
    #[error(transparent)]
    EquipmentFailure(#[from] EquipmentFailure),

    /// 配置相关错误
    #[error("配置错误: {message}")]
    ConfigurationError { message: String },

    /// 并发/异步操作错误
    #[error("并发错误: {message}")]
    ConcurrencyError { message: String },

    /// 资源未找到错误
    #[error("资源未找到: {resource_type} - {message}")]
    NotFoundError {
        resource_type: String,
        message: String,
    },

    /// 测试执行相关错误（测试步骤内部的意外错误）
    #[error("测试执行错误: {test_type} - {message}")]
    TestExecutionError {
        test_type: String,
        message: String,
    },

    /// 状态转换错误
    #[error("状态转换错误: 从 {from_state} 到 {to_state} - {message}")]
    StateTransitionError {
        from_state: String,
        to_state: String,
        message: String,
    },

    /// JSON序列化/反序列化错误
    #[error("JSON序列化/反序列化错误: {message}")]
    JsonError { message: String },
}

impl AppError {
    /// 创建通用错误
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// 创建IO错误
    pub fn io_error(message: impl Into<String>, kind_str: impl Into<String>) -> Self {
        Self::IoError {
            message: message.into(),
            kind: kind_str.into(),
        }
    }

    /// 创建设备通信错误
    ///
    /// **使用场景**: 设备驱动在 `connect()` / 读写命令失败时返回，
    /// 由设备注册表统一包装为 [`EquipmentFailure`]。
    pub fn equipment_communication_error(message: impl Into<String>) -> Self {
        Self::EquipmentCommunicationError {
            message: message.into(),
        }
    }

    /// 创建配置错误
    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// 创建并发错误
    pub fn concurrency_error(message: impl Into<String>) -> Self {
        Self::ConcurrencyError {
            message: message.into(),
        }
    }

    /// 创建资源未找到错误
    pub fn not_found_error(resource_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFoundError {
            resource_type: resource_type.into(),
            message: message.into(),
        }
    }

    /// 创建测试执行错误
    pub fn test_execution_error(test_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TestExecutionError {
            test_type: test_type.into(),
            message: message.into(),
        }
    }

    /// 创建状态转换错误
    pub fn state_transition_error(
        from_state: impl Into<String>,
        to_state: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::StateTransitionError {
            from_state: from_state.into(),
            to_state: to_state.into(),
            message: message.into(),
        }
    }

    /// 创建JSON序列化错误
    pub fn json_error(message: impl Into<String>) -> Self {
        Self::JsonError {
            message: message.into(),
        }
    }

    /// 获取错误的简短描述
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Generic { .. } => "GENERIC",
            AppError::IoError { .. } => "IO_ERROR",
            AppError::EquipmentCommunicationError { .. } => "EQUIPMENT_COMMUNICATION_ERROR",
            AppError::EquipmentFailure(..) => "EQUIPMENT_FAILURE",
            AppError::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            AppError::ConcurrencyError { .. } => "CONCURRENCY_ERROR",
            AppError::NotFoundError { .. } => "NOT_FOUND_ERROR",
            AppError::TestExecutionError { .. } => "TEST_EXECUTION_ERROR",
            AppError::StateTransitionError { .. } => "STATE_TRANSITION_ERROR",
            AppError::JsonError { .. } => "JSON_ERROR",
        }
    }
}

/// 标准 I/O 错误到 AppError 的转换
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError { message: err.to_string(), kind: format!("{:?}", err.kind()) }
    }
}

/// serde_json 错误到 AppError 的转换
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::JsonError { message: err.to_string() }
    }
}

/// config crate 错误到 AppError 的转换
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigurationError { message: err.to_string() }
    }
}

/// 字符串错误到 AppError 的转换（通用错误）
impl From<String> for AppError {
    fn from(err_msg: String) -> Self {
        Self::Generic { message: err_msg }
    }
}

/// &str 错误到 AppError 的转换（通用错误）
impl From<&str> for AppError {
    fn from(err_msg: &str) -> Self {
        Self::Generic { message: err_msg.to_string() }
    }
}

/// 应用程序结果类型别名
/// 简化错误处理的类型定义
pub type AppResult<T> = Result<T, AppError>;
