//! Document ingestion pipeline: format detection, text extraction, and batch handling.

pub mod extract;
pub mod format;
mod office;
mod pdf;
pub mod service;
pub mod types;

pub use extract::extract;
pub use format::detect;
pub use service::{ingest_batch, ingest_file, read_selection};
pub use types::{ExtractionError, SelectedFile};
