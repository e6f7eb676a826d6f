//! 对象存储客户端
//!
//! 只需要一个能力：按校友 ID 保存 PDF 并返回引用，重复写入直接覆盖

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::error::AppResult;
use crate::utils::fs::{path_segment, write_atomic};

#[async_trait]
pub trait PdfStorage: Send + Sync {
    /// 保存 PDF，返回存储引用
    async fn store_pdf(&self, alumni_id: &str, bytes: &[u8]) -> AppResult<String>;
}

/// 本地 PDF 目录：`<dir>/<alumni_id>.pdf`
#[derive(Debug, Clone)]
pub struct LocalPdfStorage {
    dir: PathBuf,
}

impl LocalPdfStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PdfStorage for LocalPdfStorage {
    async fn store_pdf(&self, alumni_id: &str, bytes: &[u8]) -> AppResult<String> {
        let path = self.dir.join(format!("{}.pdf", path_segment(alumni_id)?));
        write_atomic(&path, bytes).await?;
        debug!("[校友 #{}] PDF 已保存 ({} 字节)", alumni_id, bytes.len());
        Ok(path.display().to_string())
    }
}
