//! 单元测试日志写入器
//!
//! 每次作业把带相对时间戳的文本行缓存在内存中，拿到被测单元ID（扫码结果）后
//! 才落盘到 `<log_root>/logs/<部件号>_logs/<单元ID>_<作业开始时间>.log`（追加模式）。
//! 在获得单元ID之前发生的失败可以用 `force` 强制落盘，此时文件名中单元ID为空。

use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use chrono::{DateTime, Local};
use log::debug;
use crate::utils::error::{AppError, AppResult};
use crate::utils::time_utils::{format_elapsed, format_log_file_time, now_local};

pub struct UnitLogWriter {
    log_root: PathBuf,
    part_number: String,
    started_at: Instant,
    started_local: DateTime<Local>,
    unit_id: String,
    buffer: Vec<u8>,
    last_file: Option<PathBuf>,
}

impl UnitLogWriter {
    pub fn new(log_root: impl Into<PathBuf>, part_number: impl Into<String>) -> Self {
        Self {
            log_root: log_root.into(),
            part_number: part_number.into(),
            started_at: Instant::now(),
            started_local: now_local(),
            unit_id: String::new(),
            buffer: Vec::new(),
            last_file: None,
        }
    }

    /// 开始新的作业：清空单元ID与缓存，重新记录开始时间
    pub fn start_run(&mut self, part_number: impl Into<String>) {
        self.part_number = part_number.into();
        self.started_at = Instant::now();
        self.started_local = now_local();
        self.unit_id.clear();
        self.buffer.clear();
        self.last_file = None;
    }

    pub fn set_unit_id(&mut self, unit_id: impl Into<String>) {
        self.unit_id = unit_id.into();
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn started_local(&self) -> DateTime<Local> {
        self.started_local
    }

    /// 尚未落盘的内容
    pub fn buffered(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// 最近一次落盘的文件
    pub fn last_file(&self) -> Option<&Path> {
        self.last_file.as_deref()
    }

    /// 当前单元ID对应的日志文件路径
    pub fn file_path(&self) -> PathBuf {
        self.log_root
            .join("logs")
            .join(format!("{}_logs", self.part_number))
            .join(format!(
                "{}_{}.log",
                self.unit_id,
                format_log_file_time(&self.started_local)
            ))
    }

    /// 追加一行日志
    ///
    /// 已知单元ID或 `force` 时立即落盘，返回写入的文件路径。
    /// 落盘失败时未写出的内容保留在缓存中，下次落盘会一并写入。
    pub fn log(&mut self, text: &str, force: bool) -> AppResult<Option<PathBuf>> {
        let line = format!("{} {}\n", format_elapsed(self.started_at.elapsed()), text);
        self.buffer.extend_from_slice(line.as_bytes());

        if !self.unit_id.is_empty() || force {
            self.flush()
        } else {
            Ok(None)
        }
    }

    /// 把缓存写入文件并清空缓存；缓存为空时什么也不做
    pub fn flush(&mut self) -> AppResult<Option<PathBuf>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let path = self.file_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                AppError::io_error(format!("创建日志目录失败 {}: {}", dir.display(), e), e.kind().to_string())
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::io_error(format!("打开日志文件失败 {}: {}", path.display(), e), e.kind().to_string()))?;
        let written = self.drain_into(&mut file)?;

        debug!("[UnitLog] 写入 {} 字节到 {}", written, path.display());
        self.last_file = Some(path.clone());
        Ok(Some(path))
    }

    /// 把缓存写入 `out`，已写出的部分随即从缓存移除
    ///
    /// 中途出错时缓存只剩未写出的尾部，下次落盘从断点继续，不会重复写入。
    fn drain_into<W: Write>(&mut self, out: &mut W) -> io::Result<usize> {
        let mut written = 0;
        let result = loop {
            if written == self.buffer.len() {
                break Ok(());
            }
            match out.write(&self.buffer[written..]) {
                Ok(0) => break Err(io::Error::new(io::ErrorKind::WriteZero, "日志文件不再接受写入")),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };
        self.buffer.drain(..written);
        result.map(|()| written)
    }
}
