//! # Alumni Harvester
//!
//! 用一组已登录账号批量抓取校友主页的结构化数据和 PDF 快照
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - cookie 存储、持有 page 的 `JsExecutor`
//! - `browser/` - `BrowserBackend` 契约和 chromiumoxide 实现
//!
//! ### ② 业务能力层（Services）
//! - `RateLimiter` - 每个账号独立的退避 / 请求间隔
//! - `AccountPool` - 借出 / 归还账号，冷却与停用
//! - `SessionDriver` - 会话状态机，cookie 优先的认证
//! - `PageClassifier` - 区分正常页、404、验证挑战和登录墙
//! - `profile_extractor` - 把页面快照解析为规范记录
//! - `OutcomeLog` - 追加写入 JSONL 结果日志
//!
//! ### ③ 流程层（Workflow）
//! - `ProfileFlow` - "一位校友"的完整流程（打开 → 解析 → PDF → 落库）
//!
//! ### ④ 编排层（Orchestration）
//! - `BatchOrchestrator` - 每个账号一个 worker，汇总运行结果
//! - `App` - 装配真实依赖，写出汇总和重试清单
//!
//! 外部协作方（关系型仓库、对象存储）只以 `clients/` 中的 trait 出现

pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{BrowserBackend, ChromeBackend};
pub use config::{CliArgs, Config};
pub use error::{AppError, AppResult};
pub use models::{CanonicalProfileRecord, OutcomeStatus, RunSummary, ScrapeOutcome, ScrapeTarget};
pub use orchestrator::{App, BatchOrchestrator};
pub use services::{AccountPool, RateLimiter, SessionDriver};
pub use workflow::{ProfileFlow, TargetCtx};
