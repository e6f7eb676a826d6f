use serde::{Deserialize, Serialize};

/// 浏览器中抓取到的页面快照
///
/// 由页面内执行的 JS 生成，保留页面原始显示顺序，不做任何归一化
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePage {
    /// 导航结束后的最终 URL（可能被重定向）
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// 页面正文的前若干字符，用于判断挑战页 / 404
    #[serde(default)]
    pub body_excerpt: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub experience: Vec<RawListItem>,
    #[serde(default)]
    pub education: Vec<RawListItem>,
}

/// 列表项原始文本
///
/// `primary` 是加粗的第一行，`secondary` 是第二行，`caption` 是灰色的日期行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListItem {
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub secondary: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// 规范化后的校友主页记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalProfileRecord {
    pub identity: ProfileIdentity,
    pub current_position: CurrentPosition,
    pub job_history: Vec<JobEntry>,
    pub education_history: Vec<EducationEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileIdentity {
    pub profile_id: String,
    pub profile_url: String,
    pub full_name: String,
    pub headline: Option<String>,
    pub location: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPosition {
    pub company: String,
    pub title: Option<String>,
}

/// 工作经历
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEntry {
    /// 页面显示顺序（从 0 开始）
    pub order_index: u32,
    pub company_name: String,
    pub job_title: Option<String>,
    pub date_range: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_current: bool,
}

/// 教育经历
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationEntry {
    /// 页面显示顺序（从 0 开始）
    pub order_index: u32,
    pub institution_name: String,
    pub degree: Option<String>,
    pub start_year: Option<String>,
    pub end_year: Option<String>,
}
