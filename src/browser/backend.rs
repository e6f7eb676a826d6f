//! 浏览器后端抽象
//!
//! 会话驱动只通过这个 trait 操作浏览器，真实实现见 `chrome.rs`，
//! 测试里用脚本化的假后端替换

use async_trait::async_trait;

use crate::error::AppResult;
use crate::infrastructure::CookieSet;
use crate::models::{AccountIdentity, ProfilePage};

#[async_trait]
pub trait BrowserBackend: Send + Sync + 'static {
    /// 一个账号独占的浏览器会话
    type Session: Send + 'static;

    /// 为账号启动一个新的浏览器会话（尚未登录）
    async fn open(&self, account: &AccountIdentity) -> AppResult<Self::Session>;

    async fn apply_cookies(&self, session: &mut Self::Session, cookies: &CookieSet)
        -> AppResult<()>;

    /// 打开会话校验页，返回最终落地的页面
    async fn check_session(&self, session: &mut Self::Session) -> AppResult<ProfilePage>;

    /// 用账号密码登录，返回提交后落地的页面
    async fn submit_login(
        &self,
        session: &mut Self::Session,
        email: &str,
        secret: &str,
    ) -> AppResult<ProfilePage>;

    async fn export_cookies(&self, session: &mut Self::Session) -> AppResult<CookieSet>;

    /// 当前页面的快照，等待人工完成验证时轮询
    ///
    /// 默认重新打开会话校验页
    async fn current_page(&self, session: &mut Self::Session) -> AppResult<ProfilePage> {
        self.check_session(session).await
    }

    /// 打开主页并返回页面快照
    async fn load_profile(&self, session: &mut Self::Session, url: &str)
        -> AppResult<ProfilePage>;

    /// 导出当前主页的 PDF；后端不支持时返回 `None`
    async fn export_pdf(&self, session: &mut Self::Session, url: &str)
        -> AppResult<Option<Vec<u8>>>;

    /// 关闭会话并释放浏览器进程
    async fn close(&self, session: Self::Session);
}
