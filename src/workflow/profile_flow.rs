//! 主页处理流程 - 流程层
//!
//! 核心职责：定义"一位校友"的完整处理流程
//!
//! 流程顺序：
//! 1. 归一化主页引用（无效引用直接记为 not-found，不发请求）
//! 2. 打开主页 → 分类
//! 3. 解析为规范记录
//! 4. 导出 PDF
//! 5. 写入仓库和对象存储（dry-run 跳过）

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::browser::BrowserBackend;
use crate::clients::{AlumniRepository, PdfStorage};
use crate::error::AppResult;
use crate::models::{CanonicalProfileRecord, OutcomeStatus, ScrapeOutcome};
use crate::services::account_pool::Release;
use crate::services::profile_extractor::extract;
use crate::services::rate_limiter::Signal;
use crate::services::session_driver::{FetchOutcome, SessionDriver, SessionHandle};
use crate::utils::logging::truncate_text;
use crate::utils::profile_url::normalize_profile_url;
use crate::workflow::target_ctx::TargetCtx;

/// 单个目标的处理结果：写入运行日志的结果 + 归还账号时的信号
#[derive(Debug)]
pub struct FlowResult {
    pub outcome: ScrapeOutcome,
    pub release: Release,
}

impl FlowResult {
    fn new(outcome: ScrapeOutcome, release: Release) -> Self {
        Self { outcome, release }
    }
}

/// 主页处理流程
///
/// - 编排单个目标的完整处理流程
/// - 不持有浏览器会话，会话由调用方借给它
/// - 任何失败都转换成结果值，不向上抛错
pub struct ProfileFlow<B: BrowserBackend> {
    driver: Arc<SessionDriver<B>>,
    repository: Arc<dyn AlumniRepository>,
    storage: Arc<dyn PdfStorage>,
    site_base_url: String,
    dry_run: bool,
}

impl<B: BrowserBackend> ProfileFlow<B> {
    pub fn new(
        driver: Arc<SessionDriver<B>>,
        repository: Arc<dyn AlumniRepository>,
        storage: Arc<dyn PdfStorage>,
        site_base_url: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            driver,
            repository,
            storage,
            site_base_url: site_base_url.into(),
            dry_run,
        }
    }

    pub async fn run(
        &self,
        session: &mut SessionHandle<B::Session>,
        ctx: &TargetCtx,
    ) -> FlowResult {
        let target = &ctx.target;
        let account = Some(ctx.account.as_str());
        let outcome = |status: OutcomeStatus| ScrapeOutcome::new(target, status, account);

        let Some(url) = normalize_profile_url(&self.site_base_url, &target.profile_ref) else {
            warn!("{} ⚠️ 无效的主页引用: {}", ctx, target.profile_ref);
            return FlowResult::new(
                outcome(OutcomeStatus::NotFound).with_detail("无效的主页引用"),
                Release::Unused,
            );
        };

        // ========== 1. 打开主页 ==========
        info!("{} 🔍 打开主页 {}", ctx, url);
        let page = match self.driver.fetch_profile(session, &url).await {
            FetchOutcome::Page(page) => page,
            FetchOutcome::NotFound => {
                info!("{} 主页不存在", ctx);
                return FlowResult::new(
                    outcome(OutcomeStatus::NotFound),
                    Release::Signal(Signal::Ok),
                );
            }
            FetchOutcome::SoftBlock => {
                warn!("{} 🚧 遇到限流 / 验证挑战", ctx);
                return FlowResult::new(
                    outcome(OutcomeStatus::RateLimited),
                    Release::Signal(Signal::SoftBlock),
                );
            }
            FetchOutcome::HardBlock => {
                warn!("{} ⛔ 会话被站点作废", ctx);
                return FlowResult::new(
                    outcome(OutcomeStatus::Blocked),
                    Release::Signal(Signal::HardBlock),
                );
            }
            FetchOutcome::Timeout => {
                return FlowResult::new(
                    outcome(OutcomeStatus::TimedOut),
                    Release::Signal(Signal::Timeout),
                );
            }
            FetchOutcome::Error(e) => {
                error!("{} ❌ 浏览器错误: {}", ctx, e);
                return FlowResult::new(
                    outcome(OutcomeStatus::HardFailure).with_detail(e.to_string()),
                    Release::Signal(Signal::Timeout),
                );
            }
        };

        // ========== 2. 解析 ==========
        let record = match extract(&page) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "{} 🧩 解析失败: {} (标题: {})",
                    ctx,
                    e,
                    truncate_text(&page.title, 40)
                );
                return FlowResult::new(
                    outcome(OutcomeStatus::ParseError).with_detail(e.to_string()),
                    Release::Signal(Signal::Ok),
                );
            }
        };

        // ========== 3. PDF ==========
        let pdf = self.driver.export_pdf(session, &url).await;
        if pdf.is_none() {
            warn!("{} 未能导出 PDF，只保存结构化数据", ctx);
        }

        let mut success = outcome(OutcomeStatus::Success);
        success.pdf_bytes = pdf.as_ref().map(Vec::len);

        if self.dry_run {
            info!(
                "{} 🧪 dry-run: {} @ {}，跳过写入",
                ctx, record.identity.full_name, record.current_position.company
            );
            success.record = Some(record);
            return FlowResult::new(success, Release::Signal(Signal::Ok));
        }

        // ========== 4. 落库 ==========
        match self.persist(&target.alumni_id, &record, pdf.as_deref()).await {
            Ok(pdf_ref) => {
                info!(
                    "{} ✅ 已保存: {} ({} 条工作经历, {} 条教育经历)",
                    ctx,
                    record.identity.full_name,
                    record.job_history.len(),
                    record.education_history.len()
                );
                success.pdf_ref = pdf_ref;
                success.record = Some(record);
                FlowResult::new(success, Release::Signal(Signal::Ok))
            }
            Err(e) => {
                error!("{} ❌ 写入存储失败: {}", ctx, e);
                FlowResult::new(
                    outcome(OutcomeStatus::HardFailure).with_detail(e.to_string()),
                    Release::CollaboratorFailure,
                )
            }
        }
    }

    async fn persist(
        &self,
        alumni_id: &str,
        record: &CanonicalProfileRecord,
        pdf: Option<&[u8]>,
    ) -> AppResult<Option<String>> {
        self.repository.upsert_alumni(alumni_id, record).await?;
        self.repository
            .replace_job_history(alumni_id, &record.job_history)
            .await?;
        self.repository
            .replace_education_history(alumni_id, &record.education_history)
            .await?;

        match pdf {
            Some(bytes) => Ok(Some(self.storage.store_pdf(alumni_id, bytes).await?)),
            None => Ok(None),
        }
    }
}
