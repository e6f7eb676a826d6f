use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::account::AccountState;
use crate::models::profile::CanonicalProfileRecord;
use crate::models::target::ScrapeTarget;

/// 单个目标的处理结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeStatus {
    Success,
    NotFound,
    /// 账号级别的封禁 / 会话被站点作废
    Blocked,
    /// 软封禁：限流或验证挑战
    RateLimited,
    ParseError,
    /// 浏览器异常或存储协作方失败
    HardFailure,
    TimedOut,
}

impl OutcomeStatus {
    /// 是否进入下一次运行的重试清单
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            OutcomeStatus::Blocked
                | OutcomeStatus::RateLimited
                | OutcomeStatus::HardFailure
                | OutcomeStatus::TimedOut
        )
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::NotFound => "not-found",
            OutcomeStatus::Blocked => "blocked",
            OutcomeStatus::RateLimited => "rate-limited",
            OutcomeStatus::ParseError => "parse-error",
            OutcomeStatus::HardFailure => "hard-failure",
            OutcomeStatus::TimedOut => "timed-out",
        };
        f.write_str(label)
    }
}

/// 单个目标的处理结果（运行日志中的一行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    pub target: ScrapeTarget,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<CanonicalProfileRecord>,
    /// 对象存储返回的 PDF 引用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_bytes: Option<usize>,
    pub account: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ScrapeOutcome {
    pub fn new(target: &ScrapeTarget, status: OutcomeStatus, account: Option<&str>) -> Self {
        Self {
            target: target.clone(),
            status,
            record: None,
            pdf_ref: None,
            pdf_bytes: None,
            account: account.map(str::to_string),
            timestamp: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// 各状态计数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub success: usize,
    pub not_found: usize,
    pub blocked: usize,
    pub rate_limited: usize,
    pub parse_error: usize,
    pub hard_failure: usize,
    pub timed_out: usize,
}

impl StatusCounts {
    pub fn tally(outcomes: &[ScrapeOutcome]) -> Self {
        let mut counts = Self::default();
        for outcome in outcomes {
            counts.add(outcome.status);
        }
        counts
    }

    pub fn add(&mut self, status: OutcomeStatus) {
        match status {
            OutcomeStatus::Success => self.success += 1,
            OutcomeStatus::NotFound => self.not_found += 1,
            OutcomeStatus::Blocked => self.blocked += 1,
            OutcomeStatus::RateLimited => self.rate_limited += 1,
            OutcomeStatus::ParseError => self.parse_error += 1,
            OutcomeStatus::HardFailure => self.hard_failure += 1,
            OutcomeStatus::TimedOut => self.timed_out += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success
            + self.not_found
            + self.blocked
            + self.rate_limited
            + self.parse_error
            + self.hard_failure
            + self.timed_out
    }
}

/// 提前结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EarlyStop {
    /// 收到停止信号
    Cancelled,
    /// 所有账号都已停用
    PoolExhausted,
}

/// 运行结束时的账号快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountReport {
    pub email: String,
    pub state: AccountState,
    pub consecutive_failures: u32,
    pub profiles_fetched: u32,
}

/// 运行汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub total_targets: usize,
    pub attempted: usize,
    pub counts: StatusCounts,
    /// 下一次运行的重试清单（重试次数已 +1）
    pub retry_targets: Vec<ScrapeTarget>,
    /// 解析失败、需要人工检查的校友 ID
    pub review_targets: Vec<String>,
    pub accounts: Vec<AccountReport>,
    pub early_stop: Option<EarlyStop>,
}

impl RunSummary {
    pub fn requeued(&self) -> usize {
        self.retry_targets.len()
    }
}
