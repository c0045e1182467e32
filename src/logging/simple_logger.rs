/// 简化版Logger实现
/// 同时输出到控制台和诊断日志文件

use super::*;
use log::{Log, Metadata, Record};
use std::sync::{Arc, Mutex};
use std::fs::OpenOptions;
use std::io::{Write as IoWrite, BufWriter};
use chrono::Local;

/// 简化版Logger - 实现log::Log trait
pub struct SimpleLogger {
    config: LoggerConfig,
    file_writer: Arc<Mutex<Option<BufWriter<std::fs::File>>>>,
}

impl SimpleLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            file_writer: Arc::new(Mutex::new(None)),
        }
    }

    /// 打开文件目标并注册为全局logger
    pub fn init(self) -> Result<(), Box<dyn std::error::Error>> {
        for target in &self.config.targets {
            if let LogTarget::File { path } = target {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;

                let mut writer_guard = self.file_writer.lock().map_err(|_| "文件写入器锁定失败")?;
                *writer_guard = Some(BufWriter::new(file));
                break; // 只处理第一个文件目标
            }
        }

        let level = self.config.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level.into());

        Ok(())
    }

    fn format_record(record: &Record) -> String {
        format!(
            "[{}] [{}] [{}] - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    }

    fn write_to_console(&self, record: &Record) {
        let message = Self::format_record(record);

        match record.level() {
            log::Level::Error => eprintln!("\x1b[31m{}\x1b[0m", message),
            log::Level::Warn => eprintln!("\x1b[33m{}\x1b[0m", message),
            _ => println!("{}", message),
        }
    }

    fn write_to_file(&self, record: &Record) {
        if let Ok(mut writer_guard) = self.file_writer.lock() {
            if let Some(writer) = writer_guard.as_mut() {
                let message = Self::format_record(record);
                if let Err(e) = writeln!(writer, "{}", message) {
                    eprintln!("写入日志文件失败: {}", e);
                } else {
                    let _ = writer.flush();
                }
            }
        }
    }
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        for target in &self.config.targets {
            match target {
                LogTarget::Console => self.write_to_console(record),
                LogTarget::File { .. } => self.write_to_file(record),
            }
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();

        if let Ok(mut writer_guard) = self.file_writer.lock() {
            if let Some(writer) = writer_guard.as_mut() {
                let _ = writer.flush();
            }
        }
    }
}

/// 初始化诊断日志
///
/// 只有控制台输出时交给 env_logger（支持 `RUST_LOG`），配置了文件目标时使用 [`SimpleLogger`]。
/// 重复初始化时忽略错误，方便测试中多次调用。
pub fn init_logger(config: &LoggerConfig) {
    let result: Result<(), Box<dyn std::error::Error>> = if config.has_file_target() {
        SimpleLogger::new(config.clone()).init()
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(config.level.into())
            .try_init()
            .map_err(Into::into)
    };

    if let Err(e) = result {
        log::debug!("日志系统已初始化，忽略重复初始化: {}", e);
    }
}
