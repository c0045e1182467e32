use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use once_cell::sync::OnceCell;
use log::{debug, warn};
use crate::utils::error::{AppError, AppResult};

/// 部件号字段名（`[uservars]` 段）
pub const PART_NUMBER_KEY: &str = "partnum";

/// 用户变量段名
pub const USER_VARS_SECTION: &str = "uservars";

/// 应用程序主配置结构
/// 包含测试站运行所需的所有配置信息
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 测试站基本设置
    pub station: StationSettings,
    /// 日志配置
    pub logging_config: LoggingConfig,
}

/// 测试站基本设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationSettings {
    /// 测试站名称
    pub station_name: String,
    /// 版本号（写入每次作业日志的第二行）
    pub station_version: String,
    /// 测试日志根目录，单元日志写入 `<log_root>/logs/<部件号>_logs/`
    pub log_root: PathBuf,
    /// 部件配置文件目录（`*.ini`）
    pub part_config_dir: PathBuf,
    /// 显示层轮询事件队列的间隔（毫秒）
    pub display_poll_interval_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别 (debug, info, warn, error)
    pub log_level: String,
    /// 日志文件路径
    pub log_file_path: Option<PathBuf>,
    /// 是否启用控制台输出
    pub console_output: bool,
}

impl Default for StationSettings {
    fn default() -> Self {
        Self {
            station_name: "Commissioning Station".to_string(),
            station_version: env!("CARGO_PKG_VERSION").to_string(),
            log_root: PathBuf::from("."),
            part_config_dir: PathBuf::from("config"),
            display_poll_interval_ms: 10,
        }
    }
}

impl StationSettings {
    /// 完整版本字符串，例如 `Commissioning Station 0.1.0`
    pub fn version_string(&self) -> String {
        format!("{} {}", self.station_name, self.station_version)
    }

    pub fn display_poll_interval(&self) -> Duration {
        Duration::from_millis(self.display_poll_interval_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file_path: None,
            console_output: true,
        }
    }
}

/// 配置管理器
/// 负责加载、保存和管理应用程序配置
pub struct ConfigManager {
    config: AppConfig,
    config_file_path: PathBuf,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new(config_file_path: PathBuf) -> Self {
        Self {
            config: AppConfig::default(),
            config_file_path,
        }
    }

    /// 从文件加载配置
    pub async fn load_from_file(&mut self) -> AppResult<()> {
        if !self.config_file_path.exists() {
            // 如果配置文件不存在，创建默认配置文件
            self.save_to_file().await?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_file_path)
            .await
            .map_err(|e| AppError::io_error(format!("读取配置文件失败: {}", e), e.kind().to_string()))?;

        self.config = serde_json::from_str(&content)
            .map_err(|e| AppError::configuration_error(format!("解析配置文件失败: {}", e)))?;

        Ok(())
    }

    /// 将配置保存到文件
    pub async fn save_to_file(&self) -> AppResult<()> {
        if let Some(parent) = self.config_file_path.parent() {
            tokio::fs::create_dir_all(parent).await
                .map_err(|e| AppError::io_error(format!("创建配置目录失败: {}", e), e.kind().to_string()))?;
        }

        let content = serde_json::to_string_pretty(&self.config)
            .map_err(|e| AppError::json_error(format!("序列化配置失败: {}", e)))?;

        tokio::fs::write(&self.config_file_path, content)
            .await
            .map_err(|e| AppError::io_error(format!("写入配置文件失败: {}", e), e.kind().to_string()))?;

        Ok(())
    }

    /// 从环境变量覆盖配置
    pub fn override_from_env(&mut self) {
        if let Ok(log_root) = std::env::var("STATION_LOG_ROOT") {
            self.config.station.log_root = PathBuf::from(log_root);
        }
        if let Ok(dir) = std::env::var("STATION_CONFIG_DIR") {
            self.config.station.part_config_dir = PathBuf::from(dir);
        }
        if let Ok(poll) = std::env::var("STATION_POLL_MS") {
            if let Ok(poll) = poll.parse::<u64>() {
                self.config.station.display_poll_interval_ms = poll;
            }
        }
        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            self.config.logging_config.log_level = log_level;
        }
    }

    /// 获取配置的只读引用
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// 获取配置的可变引用
    pub fn get_config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    /// 验证配置的有效性
    pub fn validate_config(&self) -> AppResult<()> {
        if self.config.station.display_poll_interval_ms == 0 {
            return Err(AppError::configuration_error("显示轮询间隔不能为0"));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging_config.log_level.as_str()) {
            return Err(AppError::configuration_error(format!(
                "无效的日志级别: {}，有效值: {:?}",
                self.config.logging_config.log_level, valid_log_levels
            )));
        }

        Ok(())
    }
}

static GLOBAL_CONFIG: OnceCell<Mutex<ConfigManager>> = OnceCell::new();

/// 初始化全局配置管理器
pub async fn init_global_config(config_path: Option<PathBuf>) -> AppResult<()> {
    let config_path = config_path.unwrap_or_else(|| PathBuf::from("config/station_config.json"));
    let mut config_manager = ConfigManager::new(config_path);

    config_manager.load_from_file().await?;
    config_manager.override_from_env();
    config_manager.validate_config()?;

    GLOBAL_CONFIG
        .set(Mutex::new(config_manager))
        .map_err(|_| AppError::configuration_error("全局配置已经初始化"))?;

    Ok(())
}

/// 获取全局配置的只读访问
pub fn get_global_config() -> AppResult<AppConfig> {
    let config_manager = GLOBAL_CONFIG
        .get()
        .ok_or_else(|| AppError::configuration_error("全局配置未初始化"))?
        .lock()
        .map_err(|_| AppError::concurrency_error("获取全局配置锁失败"))?;

    Ok(config_manager.get_config().clone())
}

/// 部件配置
///
/// 每个部件号对应 `config/<部件号>.ini` 一个文件，至少包含：
///
/// ```ini
/// [uservars]
/// partnum = 1234-5678
///
/// [procedure]
/// commissioning = guitest
/// ```
///
/// `test_start` 时只读地读取一次 `[uservars]` 段。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartConfig {
    /// 配置名（文件名去掉扩展名）
    pub name: String,
    /// `[uservars]` 段：部件号及其他扫码/配置字段
    pub user_vars: BTreeMap<String, String>,
    /// `[procedure] commissioning` 指定的测试流程名
    pub procedure: Option<String>,
}

impl PartConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 设置一个用户变量（链式调用）
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_procedure(mut self, procedure: impl Into<String>) -> Self {
        self.procedure = Some(procedure.into());
        self
    }

    /// 从INI文件加载部件配置
    ///
    /// 缺少 `partnum` 时使用文件名作为部件号。
    pub fn load(path: &Path) -> AppResult<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::configuration_error(format!("无效的配置文件路径: {}", path.display())))?;

        let settings = config::Config::builder()
            .add_source(config::File::new(&path.to_string_lossy(), config::FileFormat::Ini).required(true))
            .build()?;

        let mut user_vars: BTreeMap<String, String> = settings
            .get::<BTreeMap<String, String>>(USER_VARS_SECTION)
            .unwrap_or_default();
        user_vars
            .entry(PART_NUMBER_KEY.to_string())
            .or_insert_with(|| name.clone());

        let procedure = settings.get::<String>("procedure.commissioning").ok();

        let part = Self { name, user_vars, procedure };
        part.validate()?;
        Ok(part)
    }

    /// 部件号
    pub fn part_number(&self) -> &str {
        self.user_vars
            .get(PART_NUMBER_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.user_vars.get(key).map(String::as_str)
    }

    /// 验证部件配置：部件号不能为空
    pub fn validate(&self) -> AppResult<()> {
        if self.part_number().trim().is_empty() {
            return Err(AppError::configuration_error(format!(
                "部件配置 {} 缺少 [{}] {}",
                self.name, USER_VARS_SECTION, PART_NUMBER_KEY
            )));
        }
        Ok(())
    }

    /// 作业日志首行使用的参数描述，部件号总是排在第一位
    pub fn parameter_summary(&self) -> String {
        let mut params = vec![format!("Part Number = {}", self.part_number())];
        params.extend(
            self.user_vars
                .iter()
                .filter(|(k, _)| k.as_str() != PART_NUMBER_KEY)
                .map(|(k, v)| format!("{} = {}", k, v)),
        );
        params.join(", ")
    }
}

/// 扫描目录下所有 `*.ini` 部件配置
///
/// 单个文件解析失败只记录警告并跳过，不影响其他部件。
pub fn scan_part_configs(dir: &Path) -> AppResult<BTreeMap<String, PartConfig>> {
    let mut parts = BTreeMap::new();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| AppError::io_error(format!("读取配置目录失败 {}: {}", dir.display(), e), e.kind().to_string()))?;

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("ini") {
            continue;
        }
        match PartConfig::load(&path) {
            Ok(part) => {
                debug!("[Config] 加载部件配置: {} ({})", part.name, path.display());
                parts.insert(part.name.clone(), part);
            }
            Err(e) => warn!("[Config] 跳过无效的部件配置 {}: {}", path.display(), e),
        }
    }

    Ok(parts)
}
