//! 会话驱动 - 业务能力层
//!
//! 负责一个账号会话的完整生命周期：
//! 未认证 -> 认证中 -> 已认证 -> 抓取中 -> 已认证 ... -> 已结束
//!
//! - 认证优先使用保存的 cookie，失效后才用账号密码登录
//! - 每一次浏览器调用都包在硬超时里
//! - 抓取结果是值（`FetchOutcome`），不会向上抛错

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::browser::BrowserBackend;
use crate::config::Config;
use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::{CookieSet, CookieStore};
use crate::models::{AccountIdentity, ProfilePage};
use crate::services::page_classifier::{PageClassifier, PageVerdict};
use crate::services::rate_limiter::Signal;

/// 人工验证期间轮询页面的间隔
const CHALLENGE_POLL: Duration = Duration::from_secs(5);

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Fetching,
    Terminated,
}

/// 会话句柄
///
/// 同一时刻只被一个账号租约持有，不存在全局单例
pub struct SessionHandle<S> {
    account: String,
    cookie_key: String,
    state: SessionState,
    inner: Option<S>,
    fetched: u32,
}

impl<S> SessionHandle<S> {
    pub fn new(account: &AccountIdentity) -> Self {
        Self {
            account: account.email.clone(),
            cookie_key: account.cookie_key.clone(),
            state: SessionState::Unauthenticated,
            inner: None,
            fetched: 0,
        }
    }

    /// 直接构造一个已认证的句柄
    pub fn authenticated(account: &AccountIdentity, inner: S) -> Self {
        let mut handle = Self::new(account);
        handle.inner = Some(inner);
        handle.state = SessionState::Authenticated;
        handle
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 本会话成功抓取的主页数
    pub fn fetched(&self) -> u32 {
        self.fetched
    }

    /// 是否可以继续用于抓取
    pub fn is_live(&self) -> bool {
        self.state == SessionState::Authenticated && self.inner.is_some()
    }

    fn transition(&mut self, next: SessionState) {
        debug!("[账号 {}] 会话状态 {:?} -> {:?}", self.account, self.state, next);
        self.state = next;
    }
}

/// 认证失败
#[derive(Debug, Error)]
pub enum AuthError {
    /// 验证挑战或反复被拒绝
    #[error("账号被拦截: {reason}")]
    Blocked { reason: String },
    #[error("认证超时")]
    Timeout,
    #[error("认证失败: {0}")]
    Failed(#[from] AppError),
}

impl AuthError {
    /// 交给账号池的信号
    pub fn signal(&self) -> Signal {
        match self {
            AuthError::Timeout => Signal::Timeout,
            AuthError::Blocked { .. } | AuthError::Failed(_) => Signal::HardBlock,
        }
    }
}

/// 保存的 cookie 检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieCheck {
    Missing,
    Valid,
    /// 站点没有接受 cookie，附带落地页的判定
    Rejected(PageVerdict),
}

/// 一次主页抓取的结果
#[derive(Debug)]
pub enum FetchOutcome {
    Page(ProfilePage),
    NotFound,
    SoftBlock,
    HardBlock,
    Timeout,
    Error(AppError),
}

/// 会话驱动
pub struct SessionDriver<B: BrowserBackend> {
    backend: Arc<B>,
    cookies: Arc<dyn CookieStore>,
    classifier: Arc<dyn PageClassifier>,
    op_timeout: Duration,
    login_attempts: u32,
    challenge_wait: Duration,
}

impl<B: BrowserBackend> SessionDriver<B> {
    pub fn new(
        backend: Arc<B>,
        cookies: Arc<dyn CookieStore>,
        classifier: Arc<dyn PageClassifier>,
        op_timeout: Duration,
        login_attempts: u32,
    ) -> Self {
        Self {
            backend,
            cookies,
            classifier,
            op_timeout,
            login_attempts: login_attempts.max(1),
            challenge_wait: Duration::ZERO,
        }
    }

    pub fn from_config(
        backend: Arc<B>,
        cookies: Arc<dyn CookieStore>,
        classifier: Arc<dyn PageClassifier>,
        config: &Config,
    ) -> Self {
        Self::new(
            backend,
            cookies,
            classifier,
            Duration::from_secs(config.fetch_timeout_secs),
            config.login_attempts,
        )
    }

    /// 遇到验证挑战时等待人工在浏览器里完成验证，而不是直接判为拦截
    pub fn with_challenge_wait(mut self, wait: Duration) -> Self {
        self.challenge_wait = wait;
        self
    }

    /// 为账号建立已认证的会话
    ///
    /// 失败时浏览器会话已经关闭，调用方只需把 `AuthError::signal()` 报告给账号池
    pub async fn authenticate(
        &self,
        account: &AccountIdentity,
    ) -> Result<SessionHandle<B::Session>, AuthError> {
        let mut handle = SessionHandle::new(account);
        handle.transition(SessionState::Authenticating);

        let mut session = self.within(self.backend.open(account)).await?;

        match self.establish(account, &mut session).await {
            Ok(()) => {
                handle.inner = Some(session);
                handle.transition(SessionState::Authenticated);
                Ok(handle)
            }
            Err(e) => {
                warn!("[账号 {}] ❌ 认证失败: {}", account.email, e);
                self.backend.close(session).await;
                handle.transition(SessionState::Terminated);
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        account: &AccountIdentity,
        session: &mut B::Session,
    ) -> Result<(), AuthError> {
        let stored = match self.cookies.load(&account.cookie_key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("[账号 {}] 读取 cookie 失败，改用密码登录: {}", account.email, e);
                None
            }
        };

        if let Some(cookie_set) = stored {
            debug!("[账号 {}] 尝试用保存的 cookie 恢复会话", account.email);
            match self.try_cookies(session, &cookie_set).await? {
                PageVerdict::Ok => {
                    info!("[账号 {}] ✓ cookie 有效，已恢复会话", account.email);
                    self.persist_cookies(&account.email, &account.cookie_key, session)
                        .await;
                    return Ok(());
                }
                PageVerdict::SoftBlock => {
                    self.resolve_challenge(account, session, "恢复会话时遇到验证挑战")
                        .await?;
                    self.persist_cookies(&account.email, &account.cookie_key, session)
                        .await;
                    return Ok(());
                }
                verdict => {
                    info!(
                        "[账号 {}] cookie 已失效 ({:?})，改用密码登录",
                        account.email, verdict
                    );
                    if let Err(e) = self.cookies.invalidate(&account.cookie_key).await {
                        warn!("[账号 {}] 删除失效 cookie 失败: {}", account.email, e);
                    }
                }
            }
        }

        let secret = account.credential_ref.resolve()?;

        for attempt in 1..=self.login_attempts {
            debug!(
                "[账号 {}] 密码登录 (第 {}/{} 次)",
                account.email, attempt, self.login_attempts
            );
            let landing = self
                .within(self.backend.submit_login(session, &account.email, &secret))
                .await?;

            match self.classifier.classify(&landing) {
                PageVerdict::Ok => {
                    info!("[账号 {}] ✓ 登录成功", account.email);
                    self.persist_cookies(&account.email, &account.cookie_key, session)
                        .await;
                    return Ok(());
                }
                PageVerdict::SoftBlock => {
                    self.resolve_challenge(account, session, "登录时遇到验证挑战")
                        .await?;
                    self.persist_cookies(&account.email, &account.cookie_key, session)
                        .await;
                    return Ok(());
                }
                verdict => {
                    warn!(
                        "[账号 {}] 登录被拒绝 ({:?})，第 {}/{} 次",
                        account.email, verdict, attempt, self.login_attempts
                    );
                }
            }
        }

        Err(AuthError::Blocked {
            reason: format!("连续 {} 次登录被拒绝", self.login_attempts),
        })
    }

    async fn try_cookies(
        &self,
        session: &mut B::Session,
        cookie_set: &CookieSet,
    ) -> Result<PageVerdict, AuthError> {
        self.within(self.backend.apply_cookies(session, cookie_set))
            .await?;
        let landing = self.within(self.backend.check_session(session)).await?;
        Ok(self.classifier.classify(&landing))
    }

    /// 遇到验证挑战：配置了人工验证窗口时轮询当前页面直到通过，否则直接判为拦截
    async fn resolve_challenge(
        &self,
        account: &AccountIdentity,
        session: &mut B::Session,
        reason: &str,
    ) -> Result<(), AuthError> {
        if self.challenge_wait.is_zero() {
            return Err(AuthError::Blocked {
                reason: reason.to_string(),
            });
        }

        info!(
            "[账号 {}] 🧑 {}，请在浏览器中完成验证 (最多等待 {:?})",
            account.email, reason, self.challenge_wait
        );
        let deadline = Instant::now() + self.challenge_wait;
        while Instant::now() < deadline {
            sleep(CHALLENGE_POLL).await;
            let page = self.within(self.backend.current_page(session)).await?;
            if self.classifier.classify(&page) == PageVerdict::Ok {
                info!("[账号 {}] ✓ 验证已完成", account.email);
                return Ok(());
            }
        }

        Err(AuthError::Blocked {
            reason: format!("{}，人工验证超时", reason),
        })
    }

    /// 只检查保存的 cookie 是否仍被站点接受，不登录也不改动存储
    pub async fn check_stored_cookies(
        &self,
        account: &AccountIdentity,
    ) -> Result<CookieCheck, AuthError> {
        let Some(cookie_set) = self.cookies.load(&account.cookie_key).await? else {
            return Ok(CookieCheck::Missing);
        };

        let mut session = self.within(self.backend.open(account)).await?;
        let verdict = self.try_cookies(&mut session, &cookie_set).await;
        self.backend.close(session).await;

        Ok(match verdict? {
            PageVerdict::Ok => CookieCheck::Valid,
            other => CookieCheck::Rejected(other),
        })
    }

    /// 抓取一个主页
    pub async fn fetch_profile(
        &self,
        handle: &mut SessionHandle<B::Session>,
        url: &str,
    ) -> FetchOutcome {
        if !handle.is_live() {
            return FetchOutcome::Error(
                BrowserError::SessionClosed {
                    account: handle.account.clone(),
                }
                .into(),
            );
        }

        handle.transition(SessionState::Fetching);
        let Some(session) = handle.inner.as_mut() else {
            return FetchOutcome::Error(
                BrowserError::SessionClosed {
                    account: handle.account.clone(),
                }
                .into(),
            );
        };
        let result = timeout(self.op_timeout, self.backend.load_profile(session, url)).await;
        handle.transition(SessionState::Authenticated);

        let page = match result {
            Err(_) => {
                warn!("[账号 {}] ⏱️ 打开主页超时: {}", handle.account, url);
                return FetchOutcome::Timeout;
            }
            Ok(Err(e)) => return FetchOutcome::Error(e),
            Ok(Ok(page)) => page,
        };

        match self.classifier.classify(&page) {
            PageVerdict::Ok => {
                handle.fetched += 1;
                FetchOutcome::Page(page)
            }
            PageVerdict::NotFound => FetchOutcome::NotFound,
            PageVerdict::SoftBlock => FetchOutcome::SoftBlock,
            PageVerdict::HardBlock => {
                warn!("[账号 {}] 会话已被站点作废，落地页: {}", handle.account, page.url);
                if let Err(e) = self.cookies.invalidate(&handle.cookie_key).await {
                    warn!("[账号 {}] 删除失效 cookie 失败: {}", handle.account, e);
                }
                handle.transition(SessionState::Terminated);
                FetchOutcome::HardBlock
            }
        }
    }

    /// 导出当前主页的 PDF，失败只记日志
    pub async fn export_pdf(
        &self,
        handle: &mut SessionHandle<B::Session>,
        url: &str,
    ) -> Option<Vec<u8>> {
        if !handle.is_live() {
            return None;
        }
        let session = handle.inner.as_mut()?;
        match timeout(self.op_timeout, self.backend.export_pdf(session, url)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!("[账号 {}] 导出 PDF 失败: {}", handle.account, e);
                None
            }
            Err(_) => {
                warn!("[账号 {}] ⏱️ 导出 PDF 超时", handle.account);
                None
            }
        }
    }

    /// 结束会话并释放浏览器；仍然有效的会话会先保存最新 cookie
    pub async fn terminate(&self, mut handle: SessionHandle<B::Session>) {
        let was_live = handle.is_live();
        let Some(mut session) = handle.inner.take() else {
            handle.transition(SessionState::Terminated);
            return;
        };

        if was_live {
            self.persist_cookies(&handle.account, &handle.cookie_key, &mut session)
                .await;
        }

        if timeout(self.op_timeout, self.backend.close(session))
            .await
            .is_err()
        {
            warn!("[账号 {}] 关闭浏览器超时", handle.account);
        }
        handle.transition(SessionState::Terminated);
        debug!(
            "[账号 {}] 会话结束，共抓取 {} 个主页",
            handle.account, handle.fetched
        );
    }

    async fn persist_cookies(&self, account: &str, key: &str, session: &mut B::Session) {
        let exported = match self.within(self.backend.export_cookies(session)).await {
            Ok(set) => set,
            Err(e) => {
                warn!("[账号 {}] 导出 cookie 失败: {}", account, e);
                return;
            }
        };
        if exported.is_empty() {
            return;
        }
        if let Err(e) = self.cookies.save(key, &exported).await {
            warn!("[账号 {}] 保存 cookie 失败: {}", account, e);
        }
    }

    async fn within<T>(&self, op: impl Future<Output = AppResult<T>>) -> Result<T, AuthError> {
        match timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => Err(AuthError::Timeout),
        }
    }
}
