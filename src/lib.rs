//! # medrec
//!
//! Symptom-to-diagnosis pipeline.
//!
//! A list of symptom names is one-hot encoded over a fixed 132-entry
//! vocabulary, passed to a pluggable classifier, and the resulting class code
//! is mapped back to a disease name.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (vocabulary, feature vector, code table, diagnosis)
//! - `ports`: Trait definitions for the classifier and persistence
//! - `adapters`: Concrete implementations (signed linear model, SQLite, log sanitizer)
//! - `application`: Use cases orchestrating domain and ports
//! - `config`: Startup configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{Diagnosis, DiagnosisOutcome, FeatureVector, Prediction};

/// Result type for medrec operations
pub type Result<T> = std::result::Result<T, MedrecError>;

/// Main error type for medrec
#[derive(Debug, thiserror::Error)]
pub enum MedrecError {
    #[error("Diagnosis failed: {0}")]
    Diagnosis(#[from] domain::DiagnosisError),

    #[error("Model error: {0}")]
    Model(#[from] adapters::ModelError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),

    #[error("Invalid reference table: {0}")]
    Table(#[from] domain::TableError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
