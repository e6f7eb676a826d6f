pub mod account;
pub mod loaders;
pub mod outcome;
pub mod profile;
pub mod target;

pub use account::{
    AccountConfig, AccountIdentity, AccountState, CookieReport, CookieStatus, CredentialRef,
};
pub use loaders::{load_worklist, save_worklist};
pub use outcome::{
    AccountReport, EarlyStop, OutcomeStatus, RunSummary, ScrapeOutcome, StatusCounts,
};
pub use profile::{
    CanonicalProfileRecord, CurrentPosition, EducationEntry, JobEntry, ProfileIdentity,
    ProfilePage, RawListItem,
};
pub use target::{ScrapeTarget, Worklist};
