//! Cookie 存储 - 基础设施层
//!
//! 按账号键保存登录后的 cookie 集合。cookie 内容对本模块是不透明的，
//! 也不判断是否过期：用 cookie 恢复会话失败时由调用方 `invalidate`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::utils::fs::write_atomic;

/// 不透明的 cookie 集合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieSet {
    pub saved_at: DateTime<Utc>,
    pub cookies: Vec<JsonValue>,
}

impl CookieSet {
    pub fn new(cookies: Vec<JsonValue>) -> Self {
        Self {
            saved_at: Utc::now(),
            cookies,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

#[async_trait]
pub trait CookieStore: Send + Sync {
    async fn load(&self, key: &str) -> AppResult<Option<CookieSet>>;
    async fn save(&self, key: &str, cookies: &CookieSet) -> AppResult<()>;
    async fn invalidate(&self, key: &str) -> AppResult<()>;
    /// 已保存的所有键（排序后）
    async fn keys(&self) -> AppResult<Vec<String>>;
}

/// 文件 cookie 存储：`<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileCookieStore {
    dir: PathBuf,
}

impl FileCookieStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl CookieStore for FileCookieStore {
    async fn load(&self, key: &str) -> AppResult<Option<CookieSet>> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("cookie 文件不存在: {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(AppError::file_read_failed(path.display().to_string(), e)),
        };

        match serde_json::from_str::<CookieSet>(&content) {
            Ok(set) if !set.is_empty() => Ok(Some(set)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("cookie 文件损坏，按不存在处理 ({}): {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &str, cookies: &CookieSet) -> AppResult<()> {
        let path = self.path_for(key);
        let bytes = serde_json::to_vec_pretty(cookies)?;
        write_atomic(&path, &bytes).await?;
        debug!("已保存 {} 个 cookie: {}", cookies.cookies.len(), path.display());
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> AppResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("cookie 已作废: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::file_delete_failed(path.display().to_string(), e)),
        }
    }

    async fn keys(&self) -> AppResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::file_read_failed(self.dir.display().to_string(), e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::file_read_failed(self.dir.display().to_string(), e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = name.strip_suffix(".json") {
                if !key.starts_with('.') {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CookieSet {
        CookieSet::new(vec![json!({"name": "li_at", "value": "abc", "domain": ".linkedin.com"})])
    }

    #[tokio::test]
    async fn save_then_load_returns_same_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCookieStore::new(dir.path());

        store.save("a_at_x_io", &sample()).await.unwrap();
        let loaded = store.load("a_at_x_io").await.unwrap().expect("cookie set");

        assert_eq!(loaded.cookies, sample().cookies);
    }

    #[tokio::test]
    async fn missing_and_invalidated_sets_load_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCookieStore::new(dir.path());

        assert!(store.load("nobody").await.unwrap().is_none());

        store.save("k", &sample()).await.unwrap();
        store.invalidate("k").await.unwrap();
        assert!(store.load("k").await.unwrap().is_none());

        // 重复作废不报错
        store.invalidate("k").await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("k.json"), "{not json").unwrap();
        let store = FileCookieStore::new(dir.path());

        assert!(store.load("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCookieStore::new(dir.path());
        store.save("one", &sample()).await.unwrap();

        assert!(store.load("two").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_lists_saved_sets_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCookieStore::new(dir.path().join("cookies"));
        assert!(store.keys().await.unwrap().is_empty());

        store.save("b_at_x_io", &sample()).await.unwrap();
        store.save("a_at_x_io", &sample()).await.unwrap();
        std::fs::write(dir.path().join("cookies").join("notes.txt"), "x").unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["a_at_x_io", "b_at_x_io"]);
    }
}
