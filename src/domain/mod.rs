//! Domain layer: Core business types and logic.
//!
//! Pure types with no I/O: the symptom vocabulary and its encoder, the
//! disease code table and its resolver, and the records built from them.

mod diagnosis;
mod disease;
mod profile;
mod symptom;

pub use diagnosis::{Diagnosis, DiagnosisError, DiagnosisOutcome};
pub use disease::{resolve, ClassIndex, DiseaseCodeTable, Prediction};
pub use profile::DiseaseProfile;
pub use symptom::{
    encode, Encoding, FeatureVector, SymptomVocabulary, TableError, FEATURE_WIDTH, SYMPTOM_NAMES,
};
