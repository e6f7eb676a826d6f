//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 装配真实的浏览器后端和存储
//! - 写出运行汇总和重试清单
//!
//! ### `batch_processor` - 批量编排器
//! - 准备清单（去重、截断）
//! - 每个账号一个 worker
//! - 汇总结果，终止剩余会话
//!
//! ### `worker` - 单个 worker 循环
//! - 借账号 → 认证 → 取目标 → 处理 → 归还
//!
//! ### `cookie_collector` - cookie 准备
//! - 逐个账号登录并保存 cookie，或检查已保存的 cookie
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理整个清单)
//!     ↓
//! worker (一次处理一个目标)
//!     ↓
//! workflow::ProfileFlow (处理单个校友)
//!     ↓
//! services (能力层：账号池 / 会话 / 限速 / 解析)
//!     ↓
//! infrastructure + browser (基础设施：cookie、JsExecutor、Chrome)
//! ```

pub mod app;
pub mod batch_processor;
pub mod cookie_collector;
pub mod worker;

pub use app::App;
pub use batch_processor::{prepare_worklist, BatchOrchestrator};
pub use cookie_collector::CookieCollector;
pub use worker::WorkerExit;
