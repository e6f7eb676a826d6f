pub mod object_storage;
pub mod repository;

pub use object_storage::{LocalPdfStorage, PdfStorage};
pub use repository::{AlumniRepository, JsonFileRepository};
