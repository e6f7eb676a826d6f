//! 主页解析 - 业务能力层
//!
//! 纯函数：把页面快照归一化为 `CanonicalProfileRecord`。
//! - 只有身份（姓名 + 主页 ID）和当前职位是必需的
//! - 工作 / 教育经历严格保持页面显示顺序，不按日期排序
//! - 有职位没公司、有学位没学校的条目会让整条记录失败，不保存半截数据

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::profile::{
    CanonicalProfileRecord, CurrentPosition, EducationEntry, JobEntry, ProfileIdentity,
    ProfilePage, RawListItem,
};
use crate::utils::profile_url::extract_profile_id;

/// 最多保留的工作经历条数
pub const MAX_JOB_ENTRIES: usize = 10;
/// 最多保留的教育经历条数
pub const MAX_EDUCATION_ENTRIES: usize = 5;

/// 解析失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("页面缺少姓名")]
    MissingName,
    #[error("无法从 URL 中解析主页 ID: {url}")]
    MissingProfileId { url: String },
    #[error("无法确定当前职位")]
    MissingCurrentPosition,
    #[error("第 {index} 条工作经历有职位但没有公司")]
    JobWithoutCompany { index: usize },
    #[error("第 {index} 条教育经历有学位但没有学校")]
    EducationWithoutInstitution { index: usize },
}

/// 解析页面快照
pub fn extract(page: &ProfilePage) -> Result<CanonicalProfileRecord, ParseError> {
    let full_name = clean_line(page.name.as_deref()).ok_or(ParseError::MissingName)?;
    let profile_id = extract_profile_id(&page.url).ok_or_else(|| ParseError::MissingProfileId {
        url: page.url.clone(),
    })?;

    let headline = clean_line(page.headline.as_deref());
    let job_history = extract_jobs(&page.experience)?;
    let education_history = extract_education(&page.education)?;
    let current_position = current_position(&job_history, headline.as_deref())
        .ok_or(ParseError::MissingCurrentPosition)?;

    Ok(CanonicalProfileRecord {
        identity: ProfileIdentity {
            profile_id,
            profile_url: strip_query(&page.url).to_string(),
            full_name,
            headline,
            location: clean_line(page.location.as_deref()),
            summary: clean_block(page.summary.as_deref()),
        },
        current_position,
        job_history,
        education_history,
    })
}

fn extract_jobs(items: &[RawListItem]) -> Result<Vec<JobEntry>, ParseError> {
    let mut jobs = Vec::new();

    for (display_index, item) in items.iter().take(MAX_JOB_ENTRIES).enumerate() {
        let title = clean_line(item.primary.as_deref());
        let company = clean_line(item.secondary.as_deref()).map(|c| strip_employment_type(&c));

        let company_name = match (company, &title) {
            (Some(company), _) => company,
            (None, Some(_)) => {
                return Err(ParseError::JobWithoutCompany {
                    index: display_index,
                })
            }
            (None, None) => continue,
        };

        let date_range = clean_line(item.caption.as_deref()).map(|d| strip_duration(&d));
        let is_current = date_range
            .as_deref()
            .map(|d| d.to_lowercase().contains("present"))
            .unwrap_or(false);
        let (start_date, end_date) = date_range
            .as_deref()
            .map(split_date_range)
            .unwrap_or((None, None));

        jobs.push(JobEntry {
            order_index: jobs.len() as u32,
            company_name,
            job_title: title,
            date_range,
            start_date,
            end_date,
            is_current,
        });
    }

    Ok(jobs)
}

fn extract_education(items: &[RawListItem]) -> Result<Vec<EducationEntry>, ParseError> {
    let mut education = Vec::new();

    for (display_index, item) in items.iter().take(MAX_EDUCATION_ENTRIES).enumerate() {
        let institution = clean_line(item.primary.as_deref());
        let degree = clean_line(item.secondary.as_deref());

        let institution_name = match (institution, &degree) {
            (Some(name), _) => name,
            (None, Some(_)) => {
                return Err(ParseError::EducationWithoutInstitution {
                    index: display_index,
                })
            }
            (None, None) => continue,
        };

        let years = item
            .caption
            .as_deref()
            .map(extract_years)
            .unwrap_or_default();

        education.push(EducationEntry {
            order_index: education.len() as u32,
            institution_name,
            degree,
            start_year: years.first().cloned(),
            end_year: years.get(1).cloned(),
        });
    }

    Ok(education)
}

/// 优先取第一条在职经历，其次第一条经历，最后从 "职位 at 公司" 形式的标题里解析
fn current_position(jobs: &[JobEntry], headline: Option<&str>) -> Option<CurrentPosition> {
    if let Some(job) = jobs.iter().find(|j| j.is_current).or_else(|| jobs.first()) {
        return Some(CurrentPosition {
            company: job.company_name.clone(),
            title: job.job_title.clone(),
        });
    }

    let headline = headline?;
    let (title, company) = headline.rsplit_once(" at ")?;
    let company = company.trim();
    if company.is_empty() {
        return None;
    }
    let title = title.trim();
    Some(CurrentPosition {
        company: company.to_string(),
        title: (!title.is_empty()).then(|| title.to_string()),
    })
}

/// 取第一行非空文本并压缩空白
fn clean_line(raw: Option<&str>) -> Option<String> {
    let line = raw?.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn clean_block(raw: Option<&str>) -> Option<String> {
    let text = raw?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// "Acme Corp · Full-time" -> "Acme Corp"
fn strip_employment_type(company: &str) -> String {
    company
        .split(" · ")
        .next()
        .unwrap_or(company)
        .trim()
        .to_string()
}

/// "Jan 2020 - Present · 4 yrs" -> "Jan 2020 - Present"
fn strip_duration(range: &str) -> String {
    range.split(" · ").next().unwrap_or(range).trim().to_string()
}

fn split_date_range(range: &str) -> (Option<String>, Option<String>) {
    let mut parts = range.splitn(2, ['-', '–', '—']).map(str::trim);
    let start = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    let end = parts
        .next()
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("present"))
        .map(str::to_string);
    (start, end)
}

fn extract_years(caption: &str) -> Vec<String> {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    let pattern = YEAR.get_or_init(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid year regex"));
    pattern
        .find_iter(caption)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(primary: Option<&str>, secondary: Option<&str>, caption: Option<&str>) -> RawListItem {
        RawListItem {
            primary: primary.map(str::to_string),
            secondary: secondary.map(str::to_string),
            caption: caption.map(str::to_string),
        }
    }

    fn base_page() -> ProfilePage {
        ProfilePage {
            url: "https://www.linkedin.com/in/jane-doe?trk=x".to_string(),
            title: "Jane Doe | LinkedIn".to_string(),
            name: Some("  Jane   Doe \n".to_string()),
            headline: Some("Engineer at Acme".to_string()),
            experience: vec![item(
                Some("Engineer\nEngineer"),
                Some("Acme Corp · Full-time"),
                Some("Mar 2021 - Present · 3 yrs"),
            )],
            ..Default::default()
        }
    }

    #[test]
    fn extracts_identity_and_current_position() {
        let record = extract(&base_page()).unwrap();

        assert_eq!(record.identity.full_name, "Jane Doe");
        assert_eq!(record.identity.profile_id, "jane-doe");
        assert_eq!(record.identity.profile_url, "https://www.linkedin.com/in/jane-doe");
        assert_eq!(record.current_position.company, "Acme Corp");
        assert_eq!(record.current_position.title.as_deref(), Some("Engineer"));

        let job = &record.job_history[0];
        assert!(job.is_current);
        assert_eq!(job.start_date.as_deref(), Some("Mar 2021"));
        assert_eq!(job.end_date, None);
        assert_eq!(job.date_range.as_deref(), Some("Mar 2021 - Present"));
    }

    #[test]
    fn optional_sections_may_be_missing() {
        let page = ProfilePage {
            headline: None,
            summary: None,
            location: None,
            ..base_page()
        };
        let record = extract(&page).unwrap();
        assert!(record.identity.headline.is_none());
        assert!(record.education_history.is_empty());
    }

    #[test]
    fn falls_back_to_headline_for_current_position() {
        let page = ProfilePage {
            experience: Vec::new(),
            headline: Some("Data Scientist at Globex".to_string()),
            ..base_page()
        };
        let record = extract(&page).unwrap();
        assert_eq!(record.current_position.company, "Globex");
        assert_eq!(record.current_position.title.as_deref(), Some("Data Scientist"));
    }

    #[test]
    fn missing_name_or_position_is_parse_error() {
        let page = ProfilePage {
            name: Some("   ".to_string()),
            ..base_page()
        };
        assert_eq!(extract(&page), Err(ParseError::MissingName));

        let page = ProfilePage {
            experience: Vec::new(),
            headline: Some("Open to work".to_string()),
            ..base_page()
        };
        assert_eq!(extract(&page), Err(ParseError::MissingCurrentPosition));
    }

    #[test]
    fn title_without_company_rejects_the_record() {
        let mut page = base_page();
        page.experience.push(item(Some("Intern"), None, Some("2019")));
        assert_eq!(extract(&page), Err(ParseError::JobWithoutCompany { index: 1 }));
    }

    #[test]
    fn degree_without_institution_rejects_the_record() {
        let mut page = base_page();
        page.education.push(item(None, Some("BSc Physics"), None));
        assert_eq!(
            extract(&page),
            Err(ParseError::EducationWithoutInstitution { index: 0 })
        );
    }

    #[test]
    fn empty_items_are_skipped_without_gaps_in_order_index() {
        let mut page = base_page();
        page.experience.push(item(None, None, None));
        page.experience.push(item(Some("Analyst"), Some("Initech"), Some("2015 - 2018")));

        let record = extract(&page).unwrap();
        let indexes: Vec<u32> = record.job_history.iter().map(|j| j.order_index).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert_eq!(record.job_history[1].company_name, "Initech");
        assert_eq!(record.job_history[1].end_date.as_deref(), Some("2018"));
    }

    #[test]
    fn display_order_wins_over_dates() {
        let mut page = base_page();
        page.experience = vec![
            item(Some("Old"), Some("First Shown"), Some("2010 - 2012")),
            item(Some("New"), Some("Second Shown"), Some("2020 - 2022")),
        ];
        let record = extract(&page).unwrap();
        assert_eq!(record.job_history[0].company_name, "First Shown");
        assert_eq!(record.job_history[1].company_name, "Second Shown");
    }

    #[test]
    fn education_years_are_parsed_from_caption() {
        let mut page = base_page();
        page.education.push(item(
            Some("State University"),
            Some("BEng, Computer Science"),
            Some("2012 – 2016"),
        ));
        let record = extract(&page).unwrap();
        let edu = &record.education_history[0];
        assert_eq!(edu.start_year.as_deref(), Some("2012"));
        assert_eq!(edu.end_year.as_deref(), Some("2016"));
    }

    #[test]
    fn history_is_capped() {
        let mut page = base_page();
        page.experience = (0..15)
            .map(|i| item(Some("Role"), Some(&format!("Company {}", i)), None))
            .collect();
        let record = extract(&page).unwrap();
        assert_eq!(record.job_history.len(), MAX_JOB_ENTRIES);
    }
}
