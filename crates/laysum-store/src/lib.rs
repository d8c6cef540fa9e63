//! Storage layer: the annotation store boundary plus in-memory and DuckDB backends.

mod document_file;
mod error;
mod export;
mod memory;
mod traits;

pub use document_file::{load_documents, parse_documents};
pub use error::StoreError;
pub use export::{annotations_to_batch, export_schema};
pub use memory::MemoryStore;
pub use traits::{AdminStore, AnnotationStore, UserSettings, within_window};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
