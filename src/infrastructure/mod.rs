pub mod cookie_store;
pub mod js_executor;

pub use cookie_store::{CookieSet, CookieStore, FileCookieStore};
pub use js_executor::JsExecutor;
