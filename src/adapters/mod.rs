//! Adapters layer: Concrete implementations of ports.
//!
//! - `linear`: signed linear SVM model, implements `Classifier`
//! - `sqlite`: SQLite for history and reference tables
//! - `sanitize`: PII filtering for logs

pub mod linear;
pub mod sanitize;
pub mod sqlite;

pub use linear::ModelError;
pub use sqlite::StorageError;
