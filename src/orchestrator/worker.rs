//! 单个 worker - 编排层
//!
//! ## 职责
//!
//! 一个 worker 循环地：借账号 → 确保会话已认证 → 取下一个目标 →
//! 委托 `ProfileFlow` 处理 → 归还账号 → 记录结果。
//!
//! - 没有可用账号时挂起等待（归还通知 / 冷却到期 / 停止信号），不空转
//! - 收到停止信号后不再取新目标，正在处理的目标会完成
//! - 被账号池逐出的会话在这里终止，保证浏览器进程被释放

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::BrowserBackend;
use crate::models::{ScrapeOutcome, ScrapeTarget};
use crate::services::account_pool::{Acquire, AccountPool, Release};
use crate::services::outcome_log::OutcomeLog;
use crate::services::session_driver::{AuthError, SessionDriver, SessionHandle};
use crate::workflow::{ProfileFlow, TargetCtx};

/// worker 之间共享的运行状态
pub struct SharedRun<B: BrowserBackend> {
    pub pool: Arc<AccountPool<B::Session>>,
    pub driver: Arc<SessionDriver<B>>,
    pub flow: Arc<ProfileFlow<B>>,
    pub outcome_log: Option<Arc<OutcomeLog>>,
    pub cancel: CancellationToken,
    queue: Mutex<VecDeque<ScrapeTarget>>,
    outcomes: Mutex<Vec<ScrapeOutcome>>,
}

impl<B: BrowserBackend> SharedRun<B> {
    pub fn new(
        pool: Arc<AccountPool<B::Session>>,
        driver: Arc<SessionDriver<B>>,
        flow: Arc<ProfileFlow<B>>,
        outcome_log: Option<Arc<OutcomeLog>>,
        cancel: CancellationToken,
        targets: Vec<ScrapeTarget>,
    ) -> Self {
        Self {
            pool,
            driver,
            flow,
            outcome_log,
            cancel,
            queue: Mutex::new(targets.into()),
            outcomes: Mutex::new(Vec::new()),
        }
    }

    fn next_target(&self) -> Option<ScrapeTarget> {
        self.queue.lock().unwrap_or_else(|p| p.into_inner()).pop_front()
    }

    fn has_targets(&self) -> bool {
        !self.queue.lock().unwrap_or_else(|p| p.into_inner()).is_empty()
    }

    fn record(&self, outcome: ScrapeOutcome) {
        if let Some(log) = &self.outcome_log {
            if let Err(e) = log.append(&outcome) {
                warn!("写入结果日志失败: {}", e);
            }
        }
        self.outcomes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(outcome);
    }

    /// 取出已完成的结果（按完成顺序）和未被处理的目标
    pub fn finish(&self) -> (Vec<ScrapeOutcome>, Vec<ScrapeTarget>) {
        let outcomes =
            std::mem::take(&mut *self.outcomes.lock().unwrap_or_else(|p| p.into_inner()));
        let remaining: Vec<ScrapeTarget> = self
            .queue
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        (outcomes, remaining)
    }

    async fn terminate_evicted(&self, evicted: Option<SessionHandle<B::Session>>) {
        if let Some(handle) = evicted {
            self.driver.terminate(handle).await;
        }
    }
}

/// worker 退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// 工作清单已经处理完
    Drained,
    Cancelled,
    /// 所有账号都已停用
    PoolExhausted,
}

/// 运行单个 worker 直到清单耗尽、收到停止信号或账号池耗尽
pub async fn run_worker<B: BrowserBackend>(worker_index: usize, run: Arc<SharedRun<B>>) -> WorkerExit {
    debug!("[worker {}] 启动", worker_index);

    loop {
        if run.cancel.is_cancelled() {
            return WorkerExit::Cancelled;
        }
        if !run.has_targets() {
            return WorkerExit::Drained;
        }

        // 先登记等待，再检查账号池，避免错过两者之间的归还通知
        let notified = run.pool.released().notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let mut lease = match run.pool.acquire() {
            Acquire::Ready(lease) => lease,
            Acquire::Exhausted => {
                warn!("[worker {}] ⛔ 所有账号都已停用", worker_index);
                return WorkerExit::PoolExhausted;
            }
            Acquire::Wait(deadline) => {
                debug!("[worker {}] 暂无可用账号，等待 {:?}", worker_index, deadline);
                match deadline {
                    Some(deadline) => {
                        tokio::select! {
                            _ = &mut notified => {}
                            _ = sleep_until(deadline) => {}
                            _ = run.cancel.cancelled() => return WorkerExit::Cancelled,
                        }
                    }
                    None => {
                        tokio::select! {
                            _ = &mut notified => {}
                            _ = run.cancel.cancelled() => return WorkerExit::Cancelled,
                        }
                    }
                }
                continue;
            }
        };

        // ========== 确保会话已认证 ==========
        let mut session = match lease.take_session() {
            Some(session) if session.is_live() => session,
            stale => {
                run.terminate_evicted(stale).await;
                match run.driver.authenticate(lease.identity()).await {
                    Ok(session) => session,
                    Err(e) => {
                        warn!("[worker {}] [账号 {}] 认证失败: {}", worker_index, lease.email(), e);
                        let release = match e {
                            AuthError::Timeout => Release::AuthTimeout,
                            other => Release::Signal(other.signal()),
                        };
                        let evicted = run.pool.release(lease, release);
                        run.terminate_evicted(evicted).await;
                        continue;
                    }
                }
            }
        };

        // ========== 取目标 ==========
        let next = if run.cancel.is_cancelled() {
            None
        } else {
            run.next_target()
        };
        let Some(target) = next else {
            lease.put_session(session);
            let evicted = run.pool.release(lease, Release::Unused);
            run.terminate_evicted(evicted).await;
            continue;
        };

        // ========== 处理 ==========
        let ctx = TargetCtx::new(target, lease.email(), worker_index);
        let result = run.flow.run(&mut session, &ctx).await;
        info!("{} → {}", ctx, result.outcome.status);
        debug!(
            "[账号 {}] 本会话已抓取 {} 个主页",
            session.account(),
            session.fetched()
        );

        lease.put_session(session);
        let evicted = run.pool.release(lease, result.release);
        run.terminate_evicted(evicted).await;
        run.record(result.outcome);
    }
}
