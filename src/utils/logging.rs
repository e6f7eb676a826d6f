/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::account::CookieReport;
use crate::models::outcome::RunSummary;

/// 初始化 tracing
///
/// 优先使用 `RUST_LOG`，否则根据 `verbose` 选择 info / debug
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},chromiumoxide=warn", default_level)));

    // 重复初始化（例如测试中）时忽略错误
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多账号主页抓取模式");
    info!("👥 账号数量: {}", config.accounts.len());
    info!("📊 最大抓取数: {}", config.max_profiles);
    if config.dry_run {
        info!("🧪 DRY-RUN: 不会写入仓库和对象存储");
    }
    info!("{}", "=".repeat(60));
}

/// 记录工作清单加载信息
pub fn log_worklist_loaded(total: usize, dispatched: usize, workers: usize) {
    info!("✓ 找到 {} 个待抓取的目标", total);
    if dispatched < total {
        info!("📋 本次只处理前 {} 个目标", dispatched);
    }
    info!("👷 并发 worker 数: {}\n", workers);
}

/// 打印最终统计信息
pub fn print_final_stats(summary: &RunSummary, summary_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        summary.finished_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
    );
    info!("耗时: {:.1} 秒", summary.duration_secs);
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.counts.success, summary.total_targets);
    info!("🔍 未找到: {}", summary.counts.not_found);
    info!("⏳ 限流: {}", summary.counts.rate_limited);
    info!("⛔ 封禁: {}", summary.counts.blocked);
    info!("⌛ 超时: {}", summary.counts.timed_out);
    info!("🧩 解析失败: {}", summary.counts.parse_error);
    info!("❌ 硬失败: {}", summary.counts.hard_failure);
    info!("🔁 待重试: {}", summary.requeued());
    if let Some(reason) = summary.early_stop {
        info!("⚠️ 提前结束: {:?}", reason);
    }
    for account in &summary.accounts {
        info!(
            "👤 {} -> {} (抓取 {} 个, 连续失败 {})",
            account.email, account.state, account.profiles_fetched, account.consecutive_failures
        );
    }
    info!("{}", "=".repeat(60));
    info!("\n汇总已保存至: {}", summary_path);
}

/// 打印 cookie 收集 / 校验结果
pub fn print_cookie_reports(reports: &[CookieReport]) {
    info!("\n{}", "=".repeat(60));
    info!("🍪 Cookie 状态");
    info!("{}", "=".repeat(60));
    for report in reports {
        info!("  {} {}", report.email, report.status);
    }
    let usable = reports.iter().filter(|r| r.status.is_usable()).count();
    info!("可用: {}/{}", usable, reports.len());
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
