//! 限速 / 退避控制器 - 业务能力层
//!
//! 每个账号一台独立的状态机：
//! - 连续失败时退避时间按 `base * 2^(n-1)` 增长，封顶 `max`
//! - 任意一次 `Ok` 立即把退避重置为 base
//! - 成功请求之后也要保持最小请求间隔（外加随机抖动），模拟人工节奏
//!
//! 账号之间没有任何协调，账号池只读取 `next_allowed`

use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;

/// 请求结果信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Ok,
    SoftBlock,
    HardBlock,
    Timeout,
}

impl Signal {
    pub fn is_failure(self) -> bool {
        !matches!(self, Signal::Ok)
    }
}

/// 退避策略
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 同一账号两次请求之间的最小间隔
    pub min_spacing: Duration,
    /// 额外随机抖动上限
    pub jitter: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_delay: Duration::from_secs(config.backoff_base_secs),
            max_delay: Duration::from_secs(config.backoff_max_secs),
            min_spacing: Duration::from_secs(config.min_request_spacing_secs),
            jitter: Duration::from_secs(config.request_jitter_secs),
        }
    }

    /// 第 `consecutive` 次连续失败对应的退避时间
    pub fn failure_delay(&self, consecutive: u32) -> Duration {
        if consecutive == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(consecutive - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn spacing_with_jitter(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.min_spacing;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        self.min_spacing + Duration::from_millis(extra)
    }
}

/// 单个账号的退避状态
#[derive(Debug, Clone)]
pub struct BackoffState {
    consecutive_failures: u32,
    next_allowed: Instant,
    current_delay: Duration,
}

impl BackoffState {
    pub fn new(now: Instant) -> Self {
        Self {
            consecutive_failures: 0,
            next_allowed: now,
            current_delay: Duration::ZERO,
        }
    }

    /// 记录一次信号，返回下一次请求之前需要等待的时间
    pub fn record(&mut self, signal: Signal, now: Instant, policy: &BackoffPolicy) -> Duration {
        let wait = if signal.is_failure() {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.current_delay = policy.failure_delay(self.consecutive_failures);
            self.current_delay
        } else {
            self.consecutive_failures = 0;
            self.current_delay = policy.base_delay;
            policy.spacing_with_jitter()
        };
        self.next_allowed = now + wait;
        wait
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn next_allowed(&self) -> Instant {
        self.next_allowed
    }

    /// 当前退避基准：失败时为本次退避，成功后回到 base
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

/// 限速器
///
/// 每个账号一把锁，账号集合在创建时固定，不需要全局锁
#[derive(Debug)]
pub struct RateLimiter {
    policy: BackoffPolicy,
    states: HashMap<String, Mutex<BackoffState>>,
}

impl RateLimiter {
    pub fn new(policy: BackoffPolicy, accounts: impl IntoIterator<Item = String>) -> Self {
        let now = Instant::now();
        let states = accounts
            .into_iter()
            .map(|email| (email, Mutex::new(BackoffState::new(now))))
            .collect();
        Self { policy, states }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// 记录信号，返回需要等待的时间
    pub fn record(&self, account: &str, signal: Signal) -> Duration {
        let Some(state) = self.states.get(account) else {
            warn!("限速器中没有账号 {}，忽略信号 {:?}", account, signal);
            return Duration::ZERO;
        };
        let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
        let wait = state.record(signal, Instant::now(), &self.policy);
        debug!(
            "[账号 {}] 信号 {:?} -> 等待 {:?} (连续失败 {})",
            account,
            signal,
            wait,
            state.consecutive_failures()
        );
        wait
    }

    /// 该账号下一次允许发出请求的时间
    pub fn next_allowed(&self, account: &str) -> Instant {
        self.states
            .get(account)
            .map(|s| s.lock().unwrap_or_else(|p| p.into_inner()).next_allowed())
            .unwrap_or_else(Instant::now)
    }

    pub fn consecutive_failures(&self, account: &str) -> u32 {
        self.states
            .get(account)
            .map(|s| s.lock().unwrap_or_else(|p| p.into_inner()).consecutive_failures())
            .unwrap_or(0)
    }

    pub fn current_delay(&self, account: &str) -> Duration {
        self.states
            .get(account)
            .map(|s| s.lock().unwrap_or_else(|p| p.into_inner()).current_delay())
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(100),
            min_spacing: Duration::from_secs(2),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn failure_delay_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.failure_delay(1), Duration::from_secs(10));
        assert_eq!(p.failure_delay(2), Duration::from_secs(20));
        assert_eq!(p.failure_delay(3), Duration::from_secs(40));
        assert_eq!(p.failure_delay(4), Duration::from_secs(80));
        assert_eq!(p.failure_delay(5), Duration::from_secs(100));
        assert_eq!(p.failure_delay(64), Duration::from_secs(100));
    }

    #[test]
    fn delay_is_non_decreasing_across_consecutive_failures() {
        let p = policy();
        let now = Instant::now();
        let mut state = BackoffState::new(now);
        let signals = [
            Signal::SoftBlock,
            Signal::Timeout,
            Signal::HardBlock,
            Signal::SoftBlock,
            Signal::Timeout,
            Signal::SoftBlock,
            Signal::SoftBlock,
        ];

        let mut previous = Duration::ZERO;
        for signal in signals {
            let wait = state.record(signal, now, &p);
            assert!(wait >= previous, "{:?} < {:?}", wait, previous);
            previous = wait;
        }
        assert_eq!(previous, p.max_delay);
    }

    #[test]
    fn ok_resets_to_base_immediately() {
        let p = policy();
        let now = Instant::now();
        let mut state = BackoffState::new(now);
        state.record(Signal::SoftBlock, now, &p);
        state.record(Signal::SoftBlock, now, &p);
        state.record(Signal::SoftBlock, now, &p);
        assert_eq!(state.current_delay(), Duration::from_secs(40));

        let wait = state.record(Signal::Ok, now, &p);
        assert_eq!(wait, p.min_spacing);
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.current_delay(), p.base_delay);

        let wait = state.record(Signal::Timeout, now, &p);
        assert_eq!(wait, p.base_delay);
    }

    #[test]
    fn spacing_is_enforced_even_on_success() {
        let p = policy();
        let now = Instant::now();
        let mut state = BackoffState::new(now);
        state.record(Signal::Ok, now, &p);
        assert_eq!(state.next_allowed(), now + Duration::from_secs(2));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = BackoffPolicy {
            jitter: Duration::from_millis(500),
            ..policy()
        };
        for _ in 0..50 {
            let spacing = p.spacing_with_jitter();
            assert!(spacing >= p.min_spacing);
            assert!(spacing <= p.min_spacing + Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_tracks_accounts_independently() {
        let limiter = RateLimiter::new(policy(), vec!["a".to_string(), "b".to_string()]);

        limiter.record("a", Signal::SoftBlock);
        limiter.record("a", Signal::SoftBlock);

        assert_eq!(limiter.consecutive_failures("a"), 2);
        assert_eq!(limiter.consecutive_failures("b"), 0);
        assert!(limiter.next_allowed("a") > limiter.next_allowed("b"));
        assert_eq!(limiter.record("unknown", Signal::SoftBlock), Duration::ZERO);
    }
}
