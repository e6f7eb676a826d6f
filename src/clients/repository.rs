//! 关系型仓库客户端
//!
//! 引擎只依赖 `AlumniRepository` 这份契约：三个操作都是幂等的整体替换，
//! 重复写同一个校友不会产生重复行

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use crate::error::AppResult;
use crate::models::{CanonicalProfileRecord, EducationEntry, JobEntry};
use crate::utils::fs::{path_segment, write_atomic};

#[async_trait]
pub trait AlumniRepository: Send + Sync {
    /// 写入或更新校友基本信息
    async fn upsert_alumni(&self, alumni_id: &str, record: &CanonicalProfileRecord)
        -> AppResult<()>;

    /// 整体替换工作经历
    async fn replace_job_history(&self, alumni_id: &str, entries: &[JobEntry]) -> AppResult<()>;

    /// 整体替换教育经历
    async fn replace_education_history(
        &self,
        alumni_id: &str,
        entries: &[EducationEntry],
    ) -> AppResult<()>;
}

/// 本地 JSON 仓库
///
/// `<dir>/<alumni_id>/{profile,jobs,education}.json`，每个文件整体覆盖写入
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn write_json<T: Serialize + ?Sized>(
        &self,
        alumni_id: &str,
        name: &str,
        value: &T,
    ) -> AppResult<()> {
        let path = self
            .dir
            .join(path_segment(alumni_id)?)
            .join(format!("{}.json", name));
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&path, &bytes).await?;
        debug!("[校友 #{}] 已写入 {}", alumni_id, path.display());
        Ok(())
    }
}

#[async_trait]
impl AlumniRepository for JsonFileRepository {
    async fn upsert_alumni(
        &self,
        alumni_id: &str,
        record: &CanonicalProfileRecord,
    ) -> AppResult<()> {
        self.write_json(alumni_id, "profile", record).await
    }

    async fn replace_job_history(&self, alumni_id: &str, entries: &[JobEntry]) -> AppResult<()> {
        self.write_json(alumni_id, "jobs", entries).await
    }

    async fn replace_education_history(
        &self,
        alumni_id: &str,
        entries: &[EducationEntry],
    ) -> AppResult<()> {
        self.write_json(alumni_id, "education", entries).await
    }
}
