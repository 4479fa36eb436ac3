//! Linear SVM adapter: Implementation of `Classifier` over an exported linear model.
//!
//! The model is a JSON export of a trained linear support vector classifier:
//!
//! ```json
//! { "format_version": 1, "n_features": 132, "decision": "ovo",
//!   "classes": [1, 3, 4], "coefficients": [[...], ...], "intercepts": [...] }
//! ```
//!
//! The decision value of row `r` is `coefficients[r] · x + intercepts[r]`.
//!
//! - `ovr`: one row per class; the highest decision value wins.
//! - `ovo`: one row per class pair `(i, j)`, `i < j`, in lexicographic order.
//!   A positive value votes for `i`, otherwise for `j`; the most votes wins.
//!
//! Ties go to the class listed first in `classes`.
//!
//! # Security
//!
//! Model directories are verified against a signed manifest before the model
//! is parsed (see [`signature`]). Unsigned loading is honoured only in debug builds.

pub mod signature;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{ClassIndex, FeatureVector};
use crate::ports::{Classifier, ClassifierError};

pub use signature::{ModelTrust, SignedModelManifest, VerifiedModel, MODEL_FILE};

const FORMAT_VERSION: u32 = 1;

/// Errors raised while loading or validating a model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model signature check failed: {0}")]
    Signature(String),

    #[error("Invalid model manifest: {0}")]
    Manifest(String),

    #[error("Invalid model format: {0}")]
    Format(String),

    #[error("Model I/O error: {0}")]
    Io(String),
}

/// Multi-class reduction used by the exported model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionScheme {
    /// One-vs-rest
    Ovr,
    /// One-vs-one
    Ovo,
}

/// Exported linear model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub format_version: u32,
    pub n_features: usize,
    pub decision: DecisionScheme,
    pub classes: Vec<i64>,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LinearModel {
    /// Number of decision rows the scheme requires for this class count.
    fn expected_rows(&self) -> usize {
        let k = self.classes.len();
        match self.decision {
            DecisionScheme::Ovr if k == 2 => 1,
            DecisionScheme::Ovr => k,
            DecisionScheme::Ovo => k * (k - 1) / 2,
        }
    }

    /// Check internal consistency.
    ///
    /// # Errors
    /// Returns `ModelError::Format` describing the first inconsistency found.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ModelError::Format(format!(
                "Unsupported format_version {}",
                self.format_version
            )));
        }
        if self.n_features == 0 {
            return Err(ModelError::Format("n_features must be > 0".into()));
        }
        if self.classes.len() < 2 {
            return Err(ModelError::Format(
                "Model must have at least two classes".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.classes.iter().find(|c| !seen.insert(**c)) {
            return Err(ModelError::Format(format!("Duplicate class {dup}")));
        }

        // A binary OvR export may also carry one row per class.
        let rows = self.coefficients.len();
        let binary_full = self.decision == DecisionScheme::Ovr && self.classes.len() == 2 && rows == 2;
        if rows != self.expected_rows() && !binary_full {
            return Err(ModelError::Format(format!(
                "Expected {} coefficient rows for {:?} with {} classes, got {rows}",
                self.expected_rows(),
                self.decision,
                self.classes.len()
            )));
        }
        if self.intercepts.len() != rows {
            return Err(ModelError::Format(format!(
                "Expected {rows} intercepts, got {}",
                self.intercepts.len()
            )));
        }
        if let Some((r, row)) = self
            .coefficients
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.n_features)
        {
            return Err(ModelError::Format(format!(
                "Coefficient row {r} has {} entries, expected {}",
                row.len(),
                self.n_features
            )));
        }
        let all_finite = self
            .coefficients
            .iter()
            .flatten()
            .chain(self.intercepts.iter())
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ModelError::Format(
                "Model parameters must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// Linear SVM classifier.
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    model: LinearModel,
}

impl LinearClassifier {
    /// Wrap already-parsed parameters.
    ///
    /// # Errors
    /// Returns `ModelError::Format` if the parameters are inconsistent.
    pub fn from_model(model: LinearModel) -> Result<Self, ModelError> {
        model.validate()?;
        Ok(Self { model })
    }

    /// Load `model.json` from `model_dir` after checking its signature.
    ///
    /// `model_dir` may also point at the model file itself; its parent
    /// directory is then used for the manifest.
    ///
    /// # Errors
    /// Returns `ModelError` if verification fails or the model is invalid.
    pub fn load(model_dir: &Path, trust: &ModelTrust) -> Result<Self, ModelError> {
        let base_dir = if model_dir.is_dir() {
            model_dir
        } else {
            model_dir.parent().unwrap_or(model_dir)
        };

        let model_path = base_dir.join(MODEL_FILE);
        let model_bytes = match trust {
            ModelTrust::Verify { key, max_age_secs } => {
                signature::verify_manifest(base_dir, key, *max_age_secs)?.model_bytes
            }
            ModelTrust::AllowUnsigned => {
                if !cfg!(debug_assertions) {
                    return Err(ModelError::Signature(
                        "Unsigned models are refused in release builds".into(),
                    ));
                }
                tracing::warn!(
                    "Loading UNSIGNED model from {:?}. This is only allowed in debug builds.",
                    base_dir
                );
                std::fs::read(&model_path)
                    .map_err(|e| ModelError::Io(format!("Failed to read {model_path:?}: {e}")))?
            }
        };

        // Parse the bytes that were verified; the file is not read again.
        let model: LinearModel =
            serde_json::from_slice(&model_bytes).map_err(|e| ModelError::Format(e.to_string()))?;
        let classifier = Self::from_model(model)?;

        tracing::info!(
            "Loaded model from {:?} (decision={:?}, n_features={}, n_classes={})",
            model_path,
            classifier.model.decision,
            classifier.model.n_features,
            classifier.model.classes.len()
        );
        Ok(classifier)
    }

    #[must_use]
    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    fn decision_values(&self, x: &[u8]) -> Vec<f64> {
        self.model
            .coefficients
            .iter()
            .zip(&self.model.intercepts)
            .map(|(row, b)| {
                row.iter()
                    .zip(x)
                    .map(|(w, &xi)| w * f64::from(xi))
                    .sum::<f64>()
                    + b
            })
            .collect()
    }

    fn predict_position(&self, x: &[u8]) -> usize {
        let decisions = self.decision_values(x);
        let k = self.model.classes.len();

        match self.model.decision {
            DecisionScheme::Ovr if decisions.len() == 1 => usize::from(decisions[0] > 0.0),
            DecisionScheme::Ovr => first_argmax(&decisions),
            DecisionScheme::Ovo => {
                let mut votes = vec![0.0_f64; k];
                let mut row = 0;
                for i in 0..k {
                    for j in (i + 1)..k {
                        if decisions[row] > 0.0 {
                            votes[i] += 1.0;
                        } else {
                            votes[j] += 1.0;
                        }
                        row += 1;
                    }
                }
                first_argmax(&votes)
            }
        }
    }
}

/// Index of the largest value; ties resolve to the lowest index.
fn first_argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

impl Classifier for LinearClassifier {
    fn feature_width(&self) -> usize {
        self.model.n_features
    }

    fn classes(&self) -> Option<Vec<ClassIndex>> {
        Some(self.model.classes.iter().copied().map(ClassIndex).collect())
    }

    fn predict(&self, batch: &[FeatureVector]) -> Result<Vec<ClassIndex>, ClassifierError> {
        batch
            .iter()
            .enumerate()
            .map(|(row, x)| {
                if x.len() != self.model.n_features {
                    return Err(ClassifierError::FeatureCount {
                        row,
                        expected: self.model.n_features,
                        actual: x.len(),
                    });
                }
                let pos = self.predict_position(x.as_slice());
                Ok(ClassIndex(self.model.classes[pos]))
            })
            .collect()
    }
}
