pub mod profile_flow;
pub mod target_ctx;

pub use profile_flow::{FlowResult, ProfileFlow};
pub use target_ctx::TargetCtx;
