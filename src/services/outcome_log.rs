//! 结果日志 - 业务能力层
//!
//! 只负责"把单个结果追加写入 JSONL 文件"，不关心流程

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::ScrapeOutcome;

/// 结果日志
///
/// 职责：
/// - 每完成一个目标追加一行
/// - 多个 worker 共用，写入互斥
/// - 只追加，不改写已有内容
pub struct OutcomeLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl OutcomeLog {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::file_write_failed(parent.display().to_string(), e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条结果
    pub fn append(&self, outcome: &ScrapeOutcome) -> AppResult<()> {
        let mut line = serde_json::to_string(outcome)?;
        line.push('\n');

        debug!(
            "写入结果日志: 校友 {} | {}",
            outcome.target.alumni_id, outcome.status
        );

        let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        file.write_all(line.as_bytes())
            .map_err(|e| AppError::file_write_failed(self.path.display().to_string(), e))?;
        Ok(())
    }
}
