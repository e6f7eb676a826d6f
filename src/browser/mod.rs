//! 浏览器后端
//!
//! - `backend` - 会话驱动依赖的 `BrowserBackend` 契约
//! - `chrome` - chromiumoxide 实现，每个账号一个独立的浏览器进程

pub mod backend;
pub mod chrome;

pub use backend::BrowserBackend;
pub use chrome::{ChromeBackend, ChromeSession};
