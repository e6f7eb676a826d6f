//! 页面分类 - 业务能力层
//!
//! 把抓到的页面判定为 正常 / 不存在 / 软封禁 / 硬封禁。
//! 具体站点的特征不写死在代码里：默认实现只做关键字匹配，关键字来自配置

use crate::config::Config;
use crate::models::profile::ProfilePage;

/// 页面判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageVerdict {
    Ok,
    NotFound,
    /// 限流页 / 验证挑战，可以退避后恢复
    SoftBlock,
    /// 被踢回登录页或账号受限
    HardBlock,
}

pub trait PageClassifier: Send + Sync {
    fn classify(&self, page: &ProfilePage) -> PageVerdict;
}

/// 关键字分类器
///
/// 以 `/` 开头的关键字匹配最终 URL 路径的前缀，其余关键字匹配标题和正文摘要（忽略大小写）。
/// 判定优先级：软封禁 > 硬封禁 > 不存在
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    not_found: Vec<String>,
    soft_block: Vec<String>,
    hard_block: Vec<String>,
}

impl KeywordClassifier {
    pub fn new(not_found: Vec<String>, soft_block: Vec<String>, hard_block: Vec<String>) -> Self {
        let lower = |v: Vec<String>| v.into_iter().map(|s| s.to_lowercase()).collect();
        Self {
            not_found: lower(not_found),
            soft_block: lower(soft_block),
            hard_block: lower(hard_block),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.not_found_markers.clone(),
            config.soft_block_markers.clone(),
            config.hard_block_markers.clone(),
        )
    }

    fn matches(markers: &[String], path: &str, text: &str) -> bool {
        markers.iter().any(|marker| {
            if marker.starts_with('/') {
                path.starts_with(marker.as_str())
            } else {
                text.contains(marker.as_str())
            }
        })
    }
}

impl PageClassifier for KeywordClassifier {
    fn classify(&self, page: &ProfilePage) -> PageVerdict {
        let path = url_path(&page.url).to_lowercase();
        let text = format!("{}\n{}", page.title, page.body_excerpt).to_lowercase();

        if Self::matches(&self.soft_block, &path, &text) {
            PageVerdict::SoftBlock
        } else if Self::matches(&self.hard_block, &path, &text) {
            PageVerdict::HardBlock
        } else if Self::matches(&self.not_found, &path, &text) {
            PageVerdict::NotFound
        } else {
            PageVerdict::Ok
        }
    }
}

/// 取出 URL 的路径部分（不含查询串）
fn url_path(url: &str) -> &str {
    let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let path = after_scheme
        .find('/')
        .map(|i| &after_scheme[i..])
        .unwrap_or("/");
    path.split(['?', '#']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::from_config(&Config::default())
    }

    fn page(url: &str, title: &str, body: &str) -> ProfilePage {
        ProfilePage {
            url: url.to_string(),
            title: title.to_string(),
            body_excerpt: body.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn normal_profile_is_ok() {
        let p = page("https://www.linkedin.com/in/jane", "Jane Doe | LinkedIn", "Experience ...");
        assert_eq!(classifier().classify(&p), PageVerdict::Ok);
    }

    #[test]
    fn challenge_is_distinct_from_not_found() {
        let challenge = page(
            "https://www.linkedin.com/checkpoint/challenge/abc",
            "Security Verification",
            "",
        );
        let missing = page("https://www.linkedin.com/in/ghost", "Page not found", "");

        assert_eq!(classifier().classify(&challenge), PageVerdict::SoftBlock);
        assert_eq!(classifier().classify(&missing), PageVerdict::NotFound);
    }

    #[test]
    fn redirect_to_login_is_hard_block() {
        let p = page("https://www.linkedin.com/login?session_redirect=x", "Sign In", "");
        assert_eq!(classifier().classify(&p), PageVerdict::HardBlock);
    }

    #[test]
    fn path_markers_do_not_match_body_text() {
        let p = page("https://www.linkedin.com/in/jane", "Jane", "I love /login pages");
        assert_eq!(classifier().classify(&p), PageVerdict::Ok);

        let p = page("https://www.linkedin.com/in/login-bob", "Bob", "");
        assert_eq!(classifier().classify(&p), PageVerdict::Ok);
    }

    #[test]
    fn url_path_strips_host_and_query() {
        assert_eq!(url_path("https://h.com/in/x?y=1"), "/in/x");
        assert_eq!(url_path("https://h.com"), "/");
        assert_eq!(url_path("/feed/#top"), "/feed/");
    }
}
