//! 应用入口 - 编排层
//!
//! 把真实的浏览器后端、cookie 存储、本地仓库和 PDF 存储装配成一个批量编排器，
//! 运行结束后写出汇总和下一次运行的重试清单。
//! `collect_cookies` 是运行前的准备步骤：为账号登录并保存 cookie

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::ChromeBackend;
use crate::clients::{JsonFileRepository, LocalPdfStorage};
use crate::config::Config;
use crate::error::ConfigError;
use crate::infrastructure::{CookieStore, FileCookieStore};
use crate::models::{load_worklist, save_worklist, RunSummary};
use crate::orchestrator::batch_processor::BatchOrchestrator;
use crate::orchestrator::cookie_collector::CookieCollector;
use crate::services::outcome_log::OutcomeLog;
use crate::services::page_classifier::KeywordClassifier;
use crate::services::session_driver::SessionDriver;
use crate::utils::fs::write_atomic;
use crate::utils::logging::{log_startup, print_cookie_reports, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    orchestrator: BatchOrchestrator<ChromeBackend>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        if config.accounts.is_empty() {
            return Err(ConfigError::NoAccounts.into());
        }

        let outcome_log = OutcomeLog::open(&config.outcome_log_file)
            .with_context(|| format!("无法打开结果日志: {}", config.outcome_log_file.display()))?;

        let orchestrator = BatchOrchestrator::new(
            &config,
            Arc::new(ChromeBackend::from_config(&config)),
            Arc::new(FileCookieStore::new(config.cookies_dir.clone())),
            Arc::new(KeywordClassifier::from_config(&config)),
            Arc::new(JsonFileRepository::new(config.output_dir.clone())),
            Arc::new(LocalPdfStorage::new(config.pdf_dir.clone())),
        )
        .with_outcome_log(Arc::new(outcome_log));

        Ok(Self {
            config,
            orchestrator,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary> {
        info!("\n📁 正在加载工作清单...");
        let worklist = load_worklist(&self.config.worklist_file).await?;
        if worklist.is_empty() {
            warn!("⚠️ 工作清单为空");
        }

        let summary = self.orchestrator.run(worklist, cancel).await;

        let json = serde_json::to_vec_pretty(&summary).context("无法序列化运行汇总")?;
        write_atomic(&self.config.summary_file, &json)
            .await
            .with_context(|| format!("无法写入运行汇总: {}", self.config.summary_file.display()))?;
        save_worklist(&self.config.retry_worklist_file, &summary.retry_targets).await?;

        print_final_stats(&summary, &self.config.summary_file.display().to_string());
        Ok(summary)
    }

    /// 收集或校验账号 cookie
    ///
    /// 收集时总是用可见浏览器，方便人工完成验证挑战
    pub async fn collect_cookies(
        mut config: Config,
        email: Option<String>,
        validate: bool,
    ) -> Result<()> {
        if config.accounts.is_empty() {
            return Err(ConfigError::NoAccounts.into());
        }
        if !validate {
            config.headless = false;
        }

        let cookies: Arc<dyn CookieStore> =
            Arc::new(FileCookieStore::new(config.cookies_dir.clone()));
        let driver = SessionDriver::from_config(
            Arc::new(ChromeBackend::from_config(&config)),
            cookies.clone(),
            Arc::new(KeywordClassifier::from_config(&config)),
            &config,
        );

        let reports = if validate {
            info!("\n🔎 正在校验已保存的 cookie...");
            CookieCollector::new(driver, cookies, &config.accounts)
                .validate()
                .await?
        } else {
            info!("\n🍪 浏览器即将打开，如遇安全验证请手动完成");
            let driver = driver
                .with_challenge_wait(Duration::from_secs(config.manual_verification_secs));
            CookieCollector::new(driver, cookies, &config.accounts)
                .collect(email.as_deref())
                .await?
        };

        print_cookie_reports(&reports);
        if !validate && reports.iter().any(|r| !r.status.is_usable()) {
            bail!("部分账号没有拿到可用的 cookie");
        }
        Ok(())
    }
}
