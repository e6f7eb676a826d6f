use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 抓取目标
///
/// 一条校友记录对应的外部主页引用（完整 URL 或者主页 ID）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeTarget {
    pub alumni_id: String,
    pub profile_ref: String,
    #[serde(default)]
    pub retry_count: u32,
}

impl ScrapeTarget {
    pub fn new(alumni_id: impl Into<String>, profile_ref: impl Into<String>) -> Self {
        Self {
            alumni_id: alumni_id.into(),
            profile_ref: profile_ref.into(),
            retry_count: 0,
        }
    }

    /// 返回一份重试次数 +1 的拷贝，用于下一次运行
    pub fn for_retry(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }
}

impl Display for ScrapeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[校友 #{} 重试#{}]", self.alumni_id, self.retry_count)
    }
}

/// 工作清单文件格式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Worklist {
    #[serde(default)]
    pub targets: Vec<ScrapeTarget>,
}
