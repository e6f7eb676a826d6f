use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::BrowserBackend;
use crate::config::Config;
use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::{CookieSet, JsExecutor};
use crate::models::{AccountIdentity, ProfilePage};

/// 在页面内生成快照：只读取原始文本，保持页面显示顺序
const SNAPSHOT_JS: &str = r#"
(() => {
    const text = (root, selector) => {
        const el = root ? root.querySelector(selector) : null;
        return el ? el.innerText.trim() : null;
    };
    const items = (root, selectors) => {
        if (!root) return [];
        return Array.from(root.querySelectorAll(selectors.item)).map(item => ({
            primary: text(item, selectors.primary),
            secondary: text(item, selectors.secondary),
            caption: text(item, selectors.caption),
        }));
    };
    const section = (id) => {
        const anchor = document.getElementById(id);
        return anchor ? anchor.closest('section') : null;
    };
    const about = section('about') || document.querySelector('section.pv-about-section');
    const body = document.body ? document.body.innerText : '';

    return {
        url: window.location.href,
        title: document.title || '',
        bodyExcerpt: body.slice(0, 2000),
        name: text(document, 'h1.text-heading-xlarge') || text(document, 'h1'),
        headline: text(document, 'div.text-body-medium'),
        location: text(document, 'span.text-body-small.inline'),
        summary: about ? text(about, 'div.inline-show-more-text') : null,
        experience: items(section('experience'), {
            item: 'li.artdeco-list__item',
            primary: 'div.t-bold span[aria-hidden="true"], span.t-bold span',
            secondary: 'span.t-14.t-normal:not(.t-black--light) span[aria-hidden="true"]',
            caption: 'span.t-14.t-normal.t-black--light span[aria-hidden="true"]',
        }),
        education: items(section('education'), {
            item: 'li.artdeco-list__item',
            primary: 'div.t-bold span[aria-hidden="true"], span.t-bold span',
            secondary: 'span.t-14.t-normal:not(.t-black--light) span[aria-hidden="true"]',
            caption: 'span.t-14.t-normal.t-black--light span[aria-hidden="true"]',
        }),
    };
})()
"#;

/// 一个账号独占的无头浏览器会话
pub struct ChromeSession {
    account: String,
    browser: Browser,
    handler: JoinHandle<()>,
    executor: JsExecutor,
}

/// 基于 chromiumoxide 的浏览器后端
///
/// 每个账号一个独立的浏览器进程和用户数据目录
#[derive(Debug, Clone)]
pub struct ChromeBackend {
    chrome_executable: Option<PathBuf>,
    headless: bool,
    profile_dir: PathBuf,
    login_url: String,
    session_check_url: String,
    username_selector: String,
    password_selector: String,
    submit_selector: String,
    page_settle: Duration,
}

impl ChromeBackend {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chrome_executable: config.chrome_executable.as_ref().map(PathBuf::from),
            headless: config.headless,
            profile_dir: config.browser_profile_dir.clone(),
            login_url: config.login_url(),
            session_check_url: config.session_check_url(),
            username_selector: config.username_selector.clone(),
            password_selector: config.password_selector.clone(),
            submit_selector: config.submit_selector.clone(),
            page_settle: Duration::from_millis(config.page_settle_ms),
        }
    }

    fn browser_config(&self, account: &AccountIdentity) -> AppResult<BrowserConfig> {
        let builder = BrowserConfig::builder();
        let mut builder = if self.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };

        builder = builder
            .user_data_dir(self.profile_dir.join(&account.cookie_key))
            .window_size(1366, 900)
            .args(vec![
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-blink-features=AutomationControlled",
            ]);

        if let Some(executable) = &self.chrome_executable {
            builder = builder.chrome_executable(executable);
        }

        builder.build().map_err(|message| {
            BrowserError::ConfigurationFailed {
                message: format!("[账号 {}] {}", account.email, message),
            }
            .into()
        })
    }

    /// 导航并等待页面稳定，返回页面快照
    async fn navigate(&self, session: &ChromeSession, url: &str) -> AppResult<ProfilePage> {
        let page = session.executor.page();
        page.goto(url)
            .await
            .map_err(|e| AppError::navigation_failed(url, e))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| AppError::navigation_failed(url, e))?;
        sleep(self.page_settle).await;
        self.snapshot(session).await
    }

    async fn snapshot(&self, session: &ChromeSession) -> AppResult<ProfilePage> {
        session.executor.eval_as::<ProfilePage>(SNAPSHOT_JS).await
    }

    async fn fill(&self, session: &ChromeSession, selector: &str, value: &str) -> AppResult<()> {
        let element = session
            .executor
            .page()
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })?;
        element.click().await?;
        element.type_str(value).await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserBackend for ChromeBackend {
    type Session = ChromeSession;

    async fn open(&self, account: &AccountIdentity) -> AppResult<ChromeSession> {
        info!("[账号 {}] 🚀 启动浏览器...", account.email);
        let config = self.browser_config(account)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::browser_launch_failed(&account.email, e))?;

        // 在后台处理浏览器事件
        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        sleep(Duration::from_millis(300)).await;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::browser_launch_failed(&account.email, e))?;
        debug!("[账号 {}] 浏览器已就绪", account.email);

        Ok(ChromeSession {
            account: account.email.clone(),
            browser,
            handler,
            executor: JsExecutor::new(page),
        })
    }

    async fn apply_cookies(&self, session: &mut ChromeSession, cookies: &CookieSet) -> AppResult<()> {
        let params: Vec<CookieParam> = cookies
            .cookies
            .iter()
            .filter_map(|raw| match serde_json::from_value::<CookieParam>(raw.clone()) {
                Ok(param) => Some(param),
                Err(e) => {
                    warn!("[账号 {}] 跳过无法识别的 cookie: {}", session.account, e);
                    None
                }
            })
            .collect();

        debug!("[账号 {}] 注入 {} 个 cookie", session.account, params.len());
        session.executor.page().set_cookies(params).await?;
        Ok(())
    }

    async fn check_session(&self, session: &mut ChromeSession) -> AppResult<ProfilePage> {
        self.navigate(session, &self.session_check_url).await
    }

    async fn submit_login(
        &self,
        session: &mut ChromeSession,
        email: &str,
        secret: &str,
    ) -> AppResult<ProfilePage> {
        self.navigate(session, &self.login_url).await?;

        self.fill(session, &self.username_selector, email).await?;
        self.fill(session, &self.password_selector, secret).await?;

        let page = session.executor.page();
        page.find_element(self.submit_selector.as_str())
            .await
            .map_err(|_| BrowserError::ElementNotFound {
                selector: self.submit_selector.clone(),
            })?
            .click()
            .await?;

        // 登录跳转可能经过多次重定向
        if let Err(e) = page.wait_for_navigation().await {
            debug!("[账号 {}] 等待登录跳转失败: {}", session.account, e);
        }
        sleep(self.page_settle).await;
        self.snapshot(session).await
    }

    async fn export_cookies(&self, session: &mut ChromeSession) -> AppResult<CookieSet> {
        let cookies = session.executor.page().get_cookies().await?;
        let values = cookies
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CookieSet::new(values))
    }

    async fn current_page(&self, session: &mut ChromeSession) -> AppResult<ProfilePage> {
        self.snapshot(session).await
    }

    async fn load_profile(&self, session: &mut ChromeSession, url: &str) -> AppResult<ProfilePage> {
        debug!("[账号 {}] 打开主页: {}", session.account, url);
        let first = self.navigate(session, url).await?;

        // 挑战页 / 404 不需要滚动
        if first.name.is_none() {
            return Ok(first);
        }

        session
            .executor
            .scroll_through(600, Duration::from_millis(400))
            .await?;
        self.snapshot(session).await
    }

    async fn export_pdf(&self, session: &mut ChromeSession, url: &str) -> AppResult<Option<Vec<u8>>> {
        let page = session.executor.page();
        let current = page.url().await?.unwrap_or_default();
        if current.split(['?', '#']).next() != url.split(['?', '#']).next() {
            self.navigate(session, url).await?;
        }

        let bytes = session
            .executor
            .page()
            .pdf(PrintToPdfParams::default())
            .await?;
        debug!("[账号 {}] PDF 导出 {} 字节", session.account, bytes.len());
        Ok((!bytes.is_empty()).then_some(bytes))
    }

    async fn close(&self, session: ChromeSession) {
        let ChromeSession {
            account,
            mut browser,
            handler,
            ..
        } = session;

        if let Err(e) = browser.close().await {
            warn!("[账号 {}] 关闭浏览器失败: {}", account, e);
        }
        if let Err(e) = browser.wait().await {
            debug!("[账号 {}] 等待浏览器进程退出失败: {}", account, e);
        }
        handler.abort();
        info!("[账号 {}] 浏览器已关闭", account);
    }
}
