pub mod worklist_loader;

pub use worklist_loader::{load_worklist, save_worklist};
