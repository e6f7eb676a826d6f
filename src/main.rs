use alumni_harvester::config::{CliArgs, Command, Config};
use alumni_harvester::orchestrator::App;
use alumni_harvester::utils::logging;
use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // 加载配置（命令行覆盖环境变量）
    let config = Config::from_env().with_cli(&args);

    // 初始化日志
    logging::init(config.verbose_logging);

    for issue in config.validate() {
        warn!("⚠️ 配置问题: {}", issue);
    }

    if let Some(Command::CollectCookies { email, validate }) = args.command {
        return App::collect_cookies(config, email, validate).await;
    }

    // Ctrl-C：完成正在处理的目标后停止
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 收到停止信号，等待正在处理的目标完成...");
            signal_token.cancel();
        }
    });

    // 初始化并运行应用
    let app = App::initialize(config).await?;
    app.run(cancel).await?;

    Ok(())
}
