//! 主页引用归一化
//!
//! 工作清单里的引用可能是完整 URL、不带协议的 URL，或者只有主页 ID

use regex::Regex;
use std::sync::OnceLock;

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:https?://)?(?:[A-Za-z0-9-]+\.)*[A-Za-z0-9-]+\.[A-Za-z]+/in/([A-Za-z0-9_-]+)(?:[/?#].*)?$")
            .expect("valid profile url regex")
    })
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid profile id regex"))
}

/// 从 URL 或裸 ID 中提取主页 ID
pub fn extract_profile_id(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    if let Some(caps) = url_pattern().captures(reference) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    if id_pattern().is_match(reference) {
        return Some(reference.to_string());
    }

    None
}

/// 归一化为 `{base}/in/{id}` 形式
pub fn normalize_profile_url(site_base_url: &str, reference: &str) -> Option<String> {
    let id = extract_profile_id(reference)?;
    Some(format!("{}/in/{}", site_base_url.trim_end_matches('/'), id))
}
