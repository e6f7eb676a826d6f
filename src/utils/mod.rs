pub mod fs;
pub mod logging;
pub mod profile_url;

pub use profile_url::{extract_profile_id, normalize_profile_url};
