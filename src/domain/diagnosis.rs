//! Diagnosis records and the errors a diagnosis request can end in.

use serde::{Deserialize, Serialize};

use super::disease::{ClassIndex, Prediction};

/// Failure of a single diagnosis request.
///
/// All variants are recoverable at the request boundary; nothing shared is
/// mutated on the way, so a failed request leaves later ones unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosisError {
    #[error("Feature vector has {actual} slots, classifier expects {expected}")]
    InvalidVectorShape { expected: usize, actual: usize },

    #[error("Classifier returned class code {0}, which is not in the disease code table")]
    UnknownClassCode(ClassIndex),

    #[error("Classifier failed: {0}")]
    Classifier(String),
}

/// Outcome of a successful diagnosis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisOutcome {
    #[serde(flatten)]
    pub prediction: Prediction,

    /// Input names that were skipped during encoding.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unrecognized: Vec<String>,
}

/// A completed diagnosis kept in history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Unique identifier
    pub id: String,

    /// Symptom names as submitted
    pub symptoms: Vec<String>,

    /// Names that were not in the vocabulary
    pub unrecognized: Vec<String>,

    pub prediction: Prediction,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Diagnosis {
    /// Record an outcome for the given input.
    #[must_use]
    pub fn new(symptoms: Vec<String>, outcome: &DiagnosisOutcome) -> Self {
        Self {
            id: uuid_v4(),
            symptoms,
            unrecognized: outcome.unrecognized.clone(),
            prediction: outcome.prediction.clone(),
            created_at: chrono::Utc::now(),
        }
    }
}

/// Generate a random UUID v4 using a ChaCha20 CSPRNG seeded from OS entropy.
fn uuid_v4() -> String {
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng = ChaCha20Rng::from_entropy();
    let mut bytes: [u8; 16] = rng.gen();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome() -> DiagnosisOutcome {
        DiagnosisOutcome {
            prediction: Prediction {
                disease: "Fungal infection".into(),
                class_index: ClassIndex(15),
            },
            unrecognized: vec!["scratchy".into()],
        }
    }

    #[test]
    fn test_diagnosis_creation() {
        let diagnosis = Diagnosis::new(vec!["itching".into(), "scratchy".into()], &outcome());
        assert_eq!(diagnosis.prediction.class_index, ClassIndex(15));
        assert_eq!(diagnosis.unrecognized, vec!["scratchy"]);
        assert_eq!(diagnosis.symptoms.len(), 2);
    }

    #[test]
    fn test_uuid_generation() {
        let id1 = uuid_v4();
        let id2 = uuid_v4();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
        assert_eq!(&id1[14..15], "4");
    }

    #[test]
    fn test_outcome_serialization_flattens_prediction() {
        let json = serde_json::to_value(outcome()).expect("Should serialize");
        assert_eq!(json["predicted_disease"], "Fungal infection");
        assert_eq!(json["disease_code"], 15);
        assert_eq!(json["unrecognized"][0], "scratchy");
    }
}
