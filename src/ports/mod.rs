//! Ports layer: Trait definitions for external operations.
//!
//! These traits are the boundaries between the application and its
//! collaborators: the trained classifier, diagnosis history and the
//! descriptive reference tables.

mod classifier;
mod reference;
mod storage;

pub use classifier::{Classifier, ClassifierError};
pub use reference::ReferenceStore;
pub use storage::{DiagnosisPage, Storage};
