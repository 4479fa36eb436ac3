//! Classifier port: the opaque model that turns a feature vector into a class code.
//!
//! The model itself (a trained statistical classifier) sits behind this trait so
//! it can be swapped without touching the encoding or resolution logic.

use crate::domain::{ClassIndex, FeatureVector};

/// Errors a classifier implementation can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    #[error("Row {row} has {actual} features, expected {expected}")]
    FeatureCount {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Classifier produced no decision: {0}")]
    NoDecision(String),
}

/// Multi-class decision function over fixed-width feature vectors.
///
/// Implementations must be stateless per call: the same vector always
/// yields the same class.
pub trait Classifier: Send + Sync {
    /// Number of features each input row must have.
    fn feature_width(&self) -> usize;

    /// Class codes the model can emit, when the implementation knows them.
    fn classes(&self) -> Option<Vec<ClassIndex>> {
        None
    }

    /// Predict one class code per row of `batch`.
    ///
    /// # Errors
    /// Returns `ClassifierError::FeatureCount` if any row has the wrong width.
    fn predict(&self, batch: &[FeatureVector]) -> Result<Vec<ClassIndex>, ClassifierError>;
}
