//! 账号池 - 业务能力层
//!
//! 负责把账号借给 worker、按信号更新账号状态：
//! - 空闲账号轮转借出，借出后为 Active
//! - 冷却中 / 已停用的账号永远不会被借出
//! - 账号的浏览器会话在两次借用之间停放在池里，租约独占会话
//! - 每次归还都会唤醒等待中的 worker
//!
//! 每个账号一把锁，没有全局锁

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{AccountConfig, AccountIdentity, AccountReport, AccountState};
use crate::services::rate_limiter::{RateLimiter, Signal};
use crate::services::session_driver::SessionHandle;

/// 账号池策略
#[derive(Debug, Clone)]
pub struct PoolPolicy {
    /// 连续硬失败多少次后停用账号
    pub hard_failure_limit: u32,
    /// 连续多少次存储协作方失败后停用账号
    pub collaborator_failure_limit: u32,
    /// 连续多少次认证超时后停用账号
    pub auth_timeout_limit: u32,
    /// 一个会话最多抓取多少个主页，之后休息并关闭会话
    pub profiles_per_session: u32,
    pub session_break: Duration,
}

impl PoolPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hard_failure_limit: config.hard_failure_limit.max(1),
            collaborator_failure_limit: config.collaborator_failure_limit.max(1),
            auth_timeout_limit: config.auth_timeout_limit.max(1),
            profiles_per_session: config.profiles_per_session,
            session_break: Duration::from_secs(config.session_break_minutes * 60),
        }
    }
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 归还账号时附带的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// 没有发出任何请求
    Unused,
    Signal(Signal),
    /// 抓取成功但存储协作方失败
    CollaboratorFailure,
    /// 登录 / 恢复会话时超时，没有取目标
    AuthTimeout,
}

/// 账号租约
///
/// 持有租约期间账号为 Active，同一账号不会被借给第二个 worker
pub struct AccountLease<S> {
    index: usize,
    identity: AccountIdentity,
    session: Option<SessionHandle<S>>,
}

impl<S> AccountLease<S> {
    pub fn identity(&self) -> &AccountIdentity {
        &self.identity
    }

    pub fn email(&self) -> &str {
        &self.identity.email
    }

    /// 取出停放的会话（如果还有效）
    pub fn take_session(&mut self) -> Option<SessionHandle<S>> {
        self.session.take()
    }

    /// 把会话放回租约，归还时一并交还给账号池
    pub fn put_session(&mut self, session: SessionHandle<S>) {
        self.session = Some(session);
    }
}

/// `acquire` 的结果
pub enum Acquire<S> {
    Ready(AccountLease<S>),
    /// 暂无可用账号；`Some` 是最早可能可用的时间，`None` 表示只能等归还通知
    Wait(Option<Instant>),
    /// 所有账号都已停用
    Exhausted,
}

struct AccountSlot<S> {
    identity: AccountIdentity,
    parked: Option<SessionHandle<S>>,
    profiles_in_session: u32,
    profiles_fetched: u32,
    collaborator_failures: u32,
    auth_timeouts: u32,
}

impl<S> AccountSlot<S> {
    fn cool_down(&mut self, wait: Duration, now: Instant) {
        self.identity.state = AccountState::CoolingDown;
        self.identity.cooldown_until = Some(now + wait);
    }
}

/// 账号池
pub struct AccountPool<S> {
    slots: Vec<Mutex<AccountSlot<S>>>,
    cursor: AtomicUsize,
    limiter: Arc<RateLimiter>,
    released: Notify,
    policy: PoolPolicy,
}

impl<S> AccountPool<S> {
    pub fn new(accounts: &[AccountConfig], limiter: Arc<RateLimiter>, policy: PoolPolicy) -> Self {
        let slots = accounts
            .iter()
            .map(|config| {
                Mutex::new(AccountSlot {
                    identity: AccountIdentity::from_config(config),
                    parked: None,
                    profiles_in_session: 0,
                    profiles_fetched: 0,
                    collaborator_failures: 0,
                    auth_timeouts: 0,
                })
            })
            .collect();

        Self {
            slots,
            cursor: AtomicUsize::new(0),
            limiter,
            released: Notify::new(),
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 归还通知；等待方应在调用 `acquire` 之前先 `enable`
    pub fn released(&self) -> &Notify {
        &self.released
    }

    fn slot(&self, index: usize) -> MutexGuard<'_, AccountSlot<S>> {
        self.slots[index].lock().unwrap_or_else(|p| p.into_inner())
    }

    /// 借出一个可用账号
    pub fn acquire(&self) -> Acquire<S> {
        let total = self.slots.len();
        if total == 0 {
            return Acquire::Exhausted;
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % total;
        let now = Instant::now();
        let mut earliest: Option<Instant> = None;
        let mut any_alive = false;

        for offset in 0..total {
            let index = (start + offset) % total;
            let mut slot = self.slot(index);

            match slot.identity.state {
                AccountState::Disabled => continue,
                AccountState::Active => {
                    any_alive = true;
                    continue;
                }
                AccountState::CoolingDown => {
                    any_alive = true;
                    match slot.identity.cooldown_until {
                        Some(until) if until > now => {
                            earliest = Some(earliest.map_or(until, |e| e.min(until)));
                            continue;
                        }
                        _ => {
                            info!("[账号 {}] ❄️ 冷却结束", slot.identity.email);
                            slot.identity.state = AccountState::Idle;
                            slot.identity.cooldown_until = None;
                        }
                    }
                }
                AccountState::Idle => any_alive = true,
            }

            let ready_at = self.limiter.next_allowed(&slot.identity.email);
            if ready_at > now {
                earliest = Some(earliest.map_or(ready_at, |e| e.min(ready_at)));
                continue;
            }

            slot.identity.state = AccountState::Active;
            return Acquire::Ready(AccountLease {
                index,
                identity: slot.identity.clone(),
                session: slot.parked.take(),
            });
        }

        if any_alive {
            Acquire::Wait(earliest)
        } else {
            Acquire::Exhausted
        }
    }

    /// 归还账号
    ///
    /// 返回被逐出的会话（如果有），调用方负责终止它
    pub fn release(&self, lease: AccountLease<S>, outcome: Release) -> Option<SessionHandle<S>> {
        let AccountLease { index, session, .. } = lease;
        let now = Instant::now();
        let mut slot = self.slot(index);
        let email = slot.identity.email.clone();
        let mut keep_session = true;

        if outcome != Release::AuthTimeout {
            slot.auth_timeouts = 0;
        }

        match outcome {
            Release::Unused => {
                slot.identity.state = AccountState::Idle;
            }
            Release::Signal(Signal::Ok) => {
                self.limiter.record(&email, Signal::Ok);
                slot.identity.consecutive_failures = 0;
                slot.collaborator_failures = 0;
                slot.identity.state = AccountState::Idle;
                keep_session = self.count_profile(&mut slot, now);
            }
            Release::Signal(Signal::SoftBlock) => {
                let wait = self.limiter.record(&email, Signal::SoftBlock);
                warn!("[账号 {}] 🚧 软封禁，冷却 {:?}", email, wait);
                slot.cool_down(wait, now);
                keep_session = false;
            }
            Release::Signal(Signal::Timeout) => {
                self.limiter.record(&email, Signal::Timeout);
                slot.identity.state = AccountState::Idle;
                keep_session = false;
            }
            Release::Signal(Signal::HardBlock) => {
                let wait = self.limiter.record(&email, Signal::HardBlock);
                slot.identity.consecutive_failures += 1;
                if slot.identity.consecutive_failures >= self.policy.hard_failure_limit {
                    warn!(
                        "[账号 {}] ⛔ 连续 {} 次硬失败，本次运行停用",
                        email, slot.identity.consecutive_failures
                    );
                    slot.identity.state = AccountState::Disabled;
                } else {
                    warn!("[账号 {}] 硬失败，冷却 {:?}", email, wait);
                    slot.cool_down(wait, now);
                }
                keep_session = false;
            }
            Release::AuthTimeout => {
                let wait = self.limiter.record(&email, Signal::Timeout);
                slot.auth_timeouts += 1;
                if slot.auth_timeouts >= self.policy.auth_timeout_limit {
                    warn!(
                        "[账号 {}] ⛔ 连续 {} 次认证超时，本次运行停用",
                        email, slot.auth_timeouts
                    );
                    slot.identity.state = AccountState::Disabled;
                } else {
                    warn!("[账号 {}] ⏱️ 认证超时，{:?} 后重试", email, wait);
                    slot.identity.state = AccountState::Idle;
                }
                keep_session = false;
            }
            Release::CollaboratorFailure => {
                self.limiter.record(&email, Signal::Ok);
                slot.collaborator_failures += 1;
                slot.identity.state = AccountState::Idle;
                keep_session = self.count_profile(&mut slot, now);
                if slot.collaborator_failures >= self.policy.collaborator_failure_limit {
                    warn!(
                        "[账号 {}] ⛔ 连续 {} 次存储失败，本次运行停用",
                        email, slot.collaborator_failures
                    );
                    slot.identity.state = AccountState::Disabled;
                    keep_session = false;
                }
            }
        }

        let evicted = match session {
            Some(handle) if keep_session && handle.is_live() => {
                slot.parked = Some(handle);
                None
            }
            other => {
                slot.profiles_in_session = 0;
                other
            }
        };
        drop(slot);

        self.released.notify_waiters();
        evicted
    }

    /// 计数一次成功抓取；达到单会话上限时进入休息并返回 false（会话应关闭）
    fn count_profile(&self, slot: &mut AccountSlot<S>, now: Instant) -> bool {
        slot.profiles_fetched += 1;
        slot.profiles_in_session += 1;

        let quota = self.policy.profiles_per_session;
        if quota > 0 && slot.profiles_in_session >= quota {
            info!(
                "[账号 {}] 😴 本会话已抓取 {} 个主页，休息 {:?}",
                slot.identity.email, slot.profiles_in_session, self.policy.session_break
            );
            slot.cool_down(self.policy.session_break, now);
            return false;
        }
        true
    }

    /// 取出所有停放的会话，运行结束时统一关闭
    pub fn drain_sessions(&self) -> Vec<SessionHandle<S>> {
        (0..self.slots.len())
            .filter_map(|i| self.slot(i).parked.take())
            .collect()
    }

    /// 所有账号都已停用
    pub fn is_exhausted(&self) -> bool {
        (0..self.slots.len()).all(|i| self.slot(i).identity.state == AccountState::Disabled)
    }

    pub fn state_of(&self, email: &str) -> Option<AccountState> {
        (0..self.slots.len())
            .map(|i| self.slot(i))
            .find(|slot| slot.identity.email == email)
            .map(|slot| slot.identity.state)
    }

    pub fn report(&self) -> Vec<AccountReport> {
        (0..self.slots.len())
            .map(|i| {
                let slot = self.slot(i);
                AccountReport {
                    email: slot.identity.email.clone(),
                    state: slot.identity.state,
                    consecutive_failures: slot.identity.consecutive_failures,
                    profiles_fetched: slot.profiles_fetched,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CredentialRef;
    use crate::services::rate_limiter::BackoffPolicy;

    fn accounts(n: usize) -> Vec<AccountConfig> {
        (1..=n)
            .map(|i| AccountConfig {
                email: format!("acc{}@site.test", i),
                credential_ref: CredentialRef::new(format!("ACCOUNT_PASSWORD_{}", i)),
            })
            .collect()
    }

    fn pool(n: usize, policy: PoolPolicy) -> AccountPool<()> {
        let configs = accounts(n);
        let backoff = BackoffPolicy {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(600),
            min_spacing: Duration::ZERO,
            jitter: Duration::ZERO,
        };
        let limiter = Arc::new(RateLimiter::new(
            backoff,
            configs.iter().map(|c| c.email.clone()),
        ));
        AccountPool::new(&configs, limiter, policy)
    }

    fn policy() -> PoolPolicy {
        PoolPolicy {
            hard_failure_limit: 2,
            collaborator_failure_limit: 3,
            auth_timeout_limit: 2,
            profiles_per_session: 0,
            session_break: Duration::from_secs(60),
        }
    }

    fn ready(pool: &AccountPool<()>) -> AccountLease<()> {
        match pool.acquire() {
            Acquire::Ready(lease) => lease,
            _ => panic!("expected a ready account"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn leased_account_is_not_handed_out_twice() {
        let pool = pool(1, policy());
        let lease = ready(&pool);

        assert!(matches!(pool.acquire(), Acquire::Wait(None)));
        assert_eq!(pool.state_of(lease.email()), Some(AccountState::Active));

        pool.release(lease, Release::Unused);
        assert!(matches!(pool.acquire(), Acquire::Ready(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn round_robin_across_idle_accounts() {
        let pool = pool(2, policy());
        let a = ready(&pool);
        let b = ready(&pool);
        assert_ne!(a.email(), b.email());
    }

    #[tokio::test(start_paused = true)]
    async fn soft_block_cools_down_until_backoff_elapses() {
        let pool = pool(1, policy());
        let lease = ready(&pool);
        let email = lease.email().to_string();
        pool.release(lease, Release::Signal(Signal::SoftBlock));

        assert_eq!(pool.state_of(&email), Some(AccountState::CoolingDown));
        let Acquire::Wait(Some(until)) = pool.acquire() else {
            panic!("expected wait with deadline");
        };

        tokio::time::sleep_until(until).await;
        assert!(matches!(pool.acquire(), Acquire::Ready(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn hard_failures_disable_at_limit_and_exhaust_pool() {
        let pool = pool(1, policy());

        let lease = ready(&pool);
        pool.release(lease, Release::Signal(Signal::HardBlock));
        let Acquire::Wait(Some(until)) = pool.acquire() else {
            panic!("expected cooldown after first hard failure");
        };
        tokio::time::sleep_until(until).await;

        let lease = ready(&pool);
        pool.release(lease, Release::Signal(Signal::HardBlock));

        assert!(pool.is_exhausted());
        assert!(matches!(pool.acquire(), Acquire::Exhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_hard_failure_count() {
        let pool = pool(1, policy());
        let lease = ready(&pool);
        pool.release(lease, Release::Signal(Signal::HardBlock));
        tokio::time::advance(Duration::from_secs(3600)).await;

        let lease = ready(&pool);
        pool.release(lease, Release::Signal(Signal::Ok));
        assert_eq!(pool.report()[0].consecutive_failures, 0);
        assert_eq!(pool.report()[0].profiles_fetched, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn collaborator_failures_disable_after_limit() {
        let pool = pool(1, policy());
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(1)).await;
            let lease = ready(&pool);
            pool.release(lease, Release::CollaboratorFailure);
        }
        assert!(matches!(pool.acquire(), Acquire::Exhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_timeouts_disable_at_limit_unless_reset() {
        let pool = pool(1, policy());
        let hour = Duration::from_secs(3600);

        let lease = ready(&pool);
        pool.release(lease, Release::AuthTimeout);
        assert_eq!(pool.state_of("acc1@site.test"), Some(AccountState::Idle));

        // 认证成功后的归还会清零超时计数
        tokio::time::advance(hour).await;
        let lease = ready(&pool);
        pool.release(lease, Release::Signal(Signal::Ok));

        tokio::time::advance(hour).await;
        let lease = ready(&pool);
        pool.release(lease, Release::AuthTimeout);
        assert_eq!(pool.state_of("acc1@site.test"), Some(AccountState::Idle));

        tokio::time::advance(hour).await;
        let lease = ready(&pool);
        pool.release(lease, Release::AuthTimeout);
        assert_eq!(pool.state_of("acc1@site.test"), Some(AccountState::Disabled));
        assert!(matches!(pool.acquire(), Acquire::Exhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn live_session_is_parked_and_handed_back() {
        let pool = pool(1, policy());
        let mut lease = ready(&pool);
        let identity = lease.identity().clone();
        lease.put_session(SessionHandle::authenticated(&identity, ()));
        assert!(pool.release(lease, Release::Signal(Signal::Ok)).is_none());

        let mut lease = ready(&pool);
        assert!(lease.take_session().is_some_and(|s| s.is_live()));
    }

    #[tokio::test(start_paused = true)]
    async fn soft_block_evicts_session() {
        let pool = pool(1, policy());
        let mut lease = ready(&pool);
        let identity = lease.identity().clone();
        lease.put_session(SessionHandle::authenticated(&identity, ()));

        let evicted = pool.release(lease, Release::Signal(Signal::SoftBlock));
        assert!(evicted.is_some());
        assert!(pool.drain_sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn session_quota_rests_account_and_closes_session() {
        let pool = pool(
            1,
            PoolPolicy {
                profiles_per_session: 2,
                ..policy()
            },
        );

        for round in 0..2 {
            let mut lease = ready(&pool);
            let identity = lease.identity().clone();
            let session = lease
                .take_session()
                .unwrap_or_else(|| SessionHandle::authenticated(&identity, ()));
            lease.put_session(session);
            let evicted = pool.release(lease, Release::Signal(Signal::Ok));
            assert_eq!(evicted.is_some(), round == 1);
        }

        assert_eq!(
            pool.state_of("acc1@site.test"),
            Some(AccountState::CoolingDown)
        );
    }
}
