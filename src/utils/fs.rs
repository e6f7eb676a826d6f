use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, AppResult, StorageError};

/// 原子写入：先写临时文件再 rename
///
/// 中途崩溃时旧文件保持完整
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::file_write_failed(parent.display().to_string(), e))?;
        }
    }

    let tmp_path = temp_path_for(path);
    if let Err(e) = write_synced(&tmp_path, bytes).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(AppError::file_write_failed(tmp_path.display().to_string(), e));
    }

    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(AppError::file_write_failed(path.display().to_string(), e));
    }

    Ok(())
}

/// 数据落盘后才允许 rename，否则断电时可能留下空文件
async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// 校验作为单个路径段使用的 ID（校友 ID 会直接拼进存储路径）
pub fn path_segment(id: &str) -> AppResult<&str> {
    let invalid = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
        || Path::new(id).is_absolute();
    if invalid {
        return Err(StorageError::InvalidKey { key: id.to_string() }.into());
    }
    Ok(id)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", file_name))
}
