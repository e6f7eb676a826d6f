//! Cookie 收集 - 编排层
//!
//! 批量抓取之前的准备工作：逐个账号登录（可见浏览器，遇到验证挑战时等人工完成），
//! 把登录后的 cookie 写入存储；或者只检查已保存的 cookie 是否还能用

use std::sync::Arc;
use tracing::{info, warn};

use crate::browser::BrowserBackend;
use crate::error::{AppResult, ConfigError};
use crate::infrastructure::CookieStore;
use crate::models::{AccountConfig, AccountIdentity, CookieReport, CookieStatus};
use crate::services::session_driver::{CookieCheck, SessionDriver};

pub struct CookieCollector<B: BrowserBackend> {
    driver: SessionDriver<B>,
    cookies: Arc<dyn CookieStore>,
    accounts: Vec<AccountIdentity>,
}

impl<B: BrowserBackend> CookieCollector<B> {
    pub fn new(
        driver: SessionDriver<B>,
        cookies: Arc<dyn CookieStore>,
        accounts: &[AccountConfig],
    ) -> Self {
        Self {
            driver,
            cookies,
            accounts: accounts.iter().map(AccountIdentity::from_config).collect(),
        }
    }

    fn select(&self, email: Option<&str>) -> AppResult<Vec<&AccountIdentity>> {
        match email {
            None => Ok(self.accounts.iter().collect()),
            Some(email) => self
                .accounts
                .iter()
                .find(|a| a.email.eq_ignore_ascii_case(email))
                .map(|a| vec![a])
                .ok_or_else(|| {
                    ConfigError::UnknownAccount {
                        email: email.to_string(),
                    }
                    .into()
                }),
        }
    }

    /// 登录并保存 cookie
    pub async fn collect(&self, email: Option<&str>) -> AppResult<Vec<CookieReport>> {
        let mut reports = Vec::new();

        for account in self.select(email)? {
            info!("[账号 {}] 🍪 开始收集 cookie", account.email);
            let status = match self.driver.authenticate(account).await {
                Ok(session) => {
                    // 结束会话时会写出最新 cookie
                    self.driver.terminate(session).await;
                    match self.cookies.load(&account.cookie_key).await {
                        Ok(Some(_)) => CookieStatus::Saved,
                        Ok(None) => CookieStatus::Failed("浏览器没有导出 cookie".to_string()),
                        Err(e) => CookieStatus::Failed(e.to_string()),
                    }
                }
                Err(e) => CookieStatus::Failed(e.to_string()),
            };
            reports.push(CookieReport {
                email: account.email.clone(),
                status,
            });
        }

        Ok(reports)
    }

    /// 检查每个配置账号保存的 cookie
    pub async fn validate(&self) -> AppResult<Vec<CookieReport>> {
        let mut reports = Vec::new();

        for account in &self.accounts {
            let status = match self.driver.check_stored_cookies(account).await {
                Ok(CookieCheck::Missing) => CookieStatus::Missing,
                Ok(CookieCheck::Valid) => CookieStatus::Valid,
                Ok(CookieCheck::Rejected(verdict)) => {
                    CookieStatus::Invalid(format!("落地页判定为 {:?}", verdict))
                }
                Err(e) => CookieStatus::Invalid(e.to_string()),
            };
            reports.push(CookieReport {
                email: account.email.clone(),
                status,
            });
        }

        for key in self.cookies.keys().await? {
            if !self.accounts.iter().any(|a| a.cookie_key == key) {
                warn!("⚠️ cookie {} 不属于任何配置的账号，已跳过", key);
            }
        }

        Ok(reports)
    }
}
