pub mod account_pool;
pub mod outcome_log;
pub mod page_classifier;
pub mod profile_extractor;
pub mod rate_limiter;
pub mod session_driver;

pub use account_pool::{Acquire, AccountLease, AccountPool, PoolPolicy, Release};
pub use outcome_log::OutcomeLog;
pub use page_classifier::{KeywordClassifier, PageClassifier, PageVerdict};
pub use profile_extractor::{extract, ParseError};
pub use rate_limiter::{BackoffPolicy, RateLimiter, Signal};
pub use session_driver::{
    AuthError, CookieCheck, FetchOutcome, SessionDriver, SessionHandle, SessionState,
};
