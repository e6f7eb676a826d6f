use crate::models::target::{ScrapeTarget, Worklist};
use crate::utils::fs::write_atomic;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载工作清单
pub async fn load_worklist(path: &Path) -> Result<Vec<ScrapeTarget>> {
    if !path.exists() {
        anyhow::bail!("工作清单不存在: {}", path.display());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取工作清单: {}", path.display()))?;

    let worklist: Worklist = toml::from_str(&content)
        .with_context(|| format!("无法解析工作清单: {}", path.display()))?;

    tracing::info!(
        "成功加载 {} 个目标: {}",
        worklist.targets.len(),
        path.file_name().unwrap_or_default().to_string_lossy()
    );

    Ok(worklist.targets)
}

/// 把重试清单写回 TOML，供下一次运行直接作为输入
pub async fn save_worklist(path: &Path, targets: &[ScrapeTarget]) -> Result<()> {
    let worklist = Worklist {
        targets: targets.to_vec(),
    };
    let content = toml::to_string(&worklist).context("无法序列化重试清单")?;

    write_atomic(path, content.as_bytes())
        .await
        .with_context(|| format!("无法写入重试清单: {}", path.display()))?;

    tracing::info!("重试清单已保存: {} ({} 个目标)", path.display(), targets.len());
    Ok(())
}
