//! 批量处理器 - 编排层
//!
//! ## 职责
//!
//! 1. **准备清单**：去重（每位校友每次运行至多处理一次）并按 `max_profiles` 截断
//! 2. **并发控制**：每个账号一个 worker，可以用 `max_workers` 再收紧
//! 3. **资源管理**：运行结束时终止所有仍然停放在账号池里的会话
//! 4. **全局统计**：汇总结果、重试清单、人工检查清单和账号状态
//!
//! 单个目标失败不会中断运行；只有停止信号或账号池耗尽会提前结束

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::BrowserBackend;
use crate::clients::{AlumniRepository, PdfStorage};
use crate::config::Config;
use crate::infrastructure::CookieStore;
use crate::models::{EarlyStop, OutcomeStatus, RunSummary, ScrapeTarget, StatusCounts};
use crate::orchestrator::worker::{run_worker, SharedRun, WorkerExit};
use crate::services::account_pool::{AccountPool, PoolPolicy};
use crate::services::outcome_log::OutcomeLog;
use crate::services::page_classifier::PageClassifier;
use crate::services::rate_limiter::{BackoffPolicy, RateLimiter};
use crate::services::session_driver::SessionDriver;
use crate::utils::logging::log_worklist_loaded;
use crate::workflow::ProfileFlow;

/// 批量编排器
pub struct BatchOrchestrator<B: BrowserBackend> {
    pool: Arc<AccountPool<B::Session>>,
    driver: Arc<SessionDriver<B>>,
    flow: Arc<ProfileFlow<B>>,
    outcome_log: Option<Arc<OutcomeLog>>,
    max_profiles: usize,
    max_workers: usize,
    dry_run: bool,
}

impl<B: BrowserBackend> BatchOrchestrator<B> {
    pub fn new(
        config: &Config,
        backend: Arc<B>,
        cookies: Arc<dyn CookieStore>,
        classifier: Arc<dyn PageClassifier>,
        repository: Arc<dyn AlumniRepository>,
        storage: Arc<dyn PdfStorage>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            BackoffPolicy::from_config(config),
            config.accounts.iter().map(|a| a.email.clone()),
        ));
        let pool = Arc::new(AccountPool::new(
            &config.accounts,
            limiter,
            PoolPolicy::from_config(config),
        ));
        let driver = Arc::new(SessionDriver::from_config(
            backend, cookies, classifier, config,
        ));
        let flow = Arc::new(ProfileFlow::new(
            driver.clone(),
            repository,
            storage,
            config.site_base_url.clone(),
            config.dry_run,
        ));

        Self {
            pool,
            driver,
            flow,
            outcome_log: None,
            max_profiles: config.max_profiles,
            max_workers: config.max_workers,
            dry_run: config.dry_run,
        }
    }

    pub fn with_outcome_log(mut self, log: Arc<OutcomeLog>) -> Self {
        self.outcome_log = Some(log);
        self
    }

    fn worker_count(&self) -> usize {
        let accounts = self.pool.len();
        if self.max_workers == 0 {
            accounts
        } else {
            accounts.min(self.max_workers)
        }
    }

    /// 处理整个工作清单
    pub async fn run(&self, worklist: Vec<ScrapeTarget>, cancel: CancellationToken) -> RunSummary {
        let started_at = Utc::now();
        let clock = tokio::time::Instant::now();
        let run_id = started_at.format("%Y%m%dT%H%M%SZ").to_string();

        let requested = worklist.len();
        let targets = prepare_worklist(worklist, self.max_profiles);
        let total_targets = targets.len();
        let workers = self.worker_count().min(total_targets);
        log_worklist_loaded(requested, total_targets, workers);

        let run = Arc::new(SharedRun::new(
            self.pool.clone(),
            self.driver.clone(),
            self.flow.clone(),
            self.outcome_log.clone(),
            cancel.clone(),
            targets,
        ));

        let mut handles = Vec::new();
        for worker_index in 1..=workers {
            let run = run.clone();
            let handle = tokio::spawn(async move { run_worker(worker_index, run).await });
            handles.push((worker_index, handle));
        }

        let mut exhausted = false;
        for (worker_index, handle) in handles {
            match handle.await {
                Ok(WorkerExit::PoolExhausted) => exhausted = true,
                Ok(exit) => info!("[worker {}] 退出: {:?}", worker_index, exit),
                Err(e) => error!("[worker {}] 任务执行失败: {}", worker_index, e),
            }
        }

        // 终止所有停放的会话
        for session in self.pool.drain_sessions() {
            self.driver.terminate(session).await;
        }

        let (outcomes, remaining) = run.finish();
        let early_stop = if remaining.is_empty() {
            None
        } else if cancel.is_cancelled() {
            warn!("⚠️ 收到停止信号，剩余 {} 个目标未处理", remaining.len());
            Some(EarlyStop::Cancelled)
        } else if exhausted || self.pool.is_exhausted() {
            warn!("⚠️ 账号池已耗尽，剩余 {} 个目标未处理", remaining.len());
            Some(EarlyStop::PoolExhausted)
        } else {
            None
        };

        let retry_targets: Vec<ScrapeTarget> = outcomes
            .iter()
            .filter(|o| o.status.is_retryable())
            .map(|o| o.target.for_retry())
            .chain(remaining.iter().map(ScrapeTarget::for_retry))
            .collect();
        let review_targets = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::ParseError)
            .map(|o| o.target.alumni_id.clone())
            .collect();

        RunSummary {
            run_id,
            dry_run: self.dry_run,
            started_at,
            finished_at: Utc::now(),
            duration_secs: clock.elapsed().as_secs_f64(),
            total_targets,
            attempted: outcomes.len(),
            counts: StatusCounts::tally(&outcomes),
            retry_targets,
            review_targets,
            accounts: self.pool.report(),
            early_stop,
        }
    }
}

/// 去掉重复的校友 ID（保留第一次出现），再按上限截断
pub fn prepare_worklist(worklist: Vec<ScrapeTarget>, max_profiles: usize) -> Vec<ScrapeTarget> {
    let mut seen = HashSet::new();
    let before = worklist.len();
    let mut targets: Vec<ScrapeTarget> = worklist
        .into_iter()
        .filter(|t| seen.insert(t.alumni_id.clone()))
        .collect();

    if targets.len() < before {
        warn!("⚠️ 清单中有 {} 个重复的校友 ID，已忽略", before - targets.len());
    }
    targets.truncate(max_profiles);
    targets
}
