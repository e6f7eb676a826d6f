//! 目标处理上下文
//!
//! 封装"哪个 worker 用哪个账号在处理哪位校友"这一信息

use std::fmt::Display;

use crate::models::ScrapeTarget;

/// 目标处理上下文
#[derive(Debug, Clone)]
pub struct TargetCtx {
    pub target: ScrapeTarget,

    /// 当前持有租约的账号
    pub account: String,

    /// worker 编号（仅用于日志显示）
    pub worker_index: usize,
}

impl TargetCtx {
    pub fn new(target: ScrapeTarget, account: impl Into<String>, worker_index: usize) -> Self {
        Self {
            target,
            account: account.into(),
            worker_index,
        }
    }
}

impl Display for TargetCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[worker {}] [账号 {}] {}",
            self.worker_index, self.account, self.target
        )
    }
}
