//! Disease code table: classifier class codes to display names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::diagnosis::DiagnosisError;
use super::symptom::TableError;

/// Class code emitted by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassIndex(pub i64);

impl ClassIndex {
    #[must_use]
    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for ClassIndex {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

impl std::fmt::Display for ClassIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference code table for the shipped classifier.
///
/// Display names are reproduced exactly, trailing spaces included
/// (`"Diabetes "`, `"Hypertension "`), since downstream reference tables
/// are keyed on them.
const REFERENCE_CODES: [(i64, &str); 30] = [
    (15, "Fungal infection"),
    (4, "Allergy"),
    (16, "GERD"),
    (9, "Chronic cholestasis"),
    (14, "Drug Reaction"),
    (33, "Peptic ulcer disease"),
    (1, "AIDS"),
    (12, "Diabetes "),
    (17, "Gastroenteritis"),
    (6, "Bronchial Asthma"),
    (23, "Hypertension "),
    (30, "Migraine"),
    (7, "Cervical spondylosis"),
    (32, "Paralysis (brain hemorrhage)"),
    (28, "Jaundice"),
    (29, "Malaria"),
    (8, "Chicken pox"),
    (11, "Dengue"),
    (37, "Typhoid"),
    (40, "hepatitis A"),
    (19, "Hepatitis B"),
    (20, "Hepatitis C"),
    (21, "Hepatitis D"),
    (22, "Hepatitis E"),
    (3, "Alcoholic hepatitis"),
    (36, "Tuberculosis"),
    (10, "Common Cold"),
    (34, "Pneumonia"),
    (13, "Dimorphic hemmorhoids(piles)"),
    (18, "Heart attack"),
];

/// Mapping from class code to disease display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiseaseCodeTable {
    entries: BTreeMap<ClassIndex, String>,
}

impl DiseaseCodeTable {
    /// The 30-entry reference table.
    #[must_use]
    pub fn reference() -> Self {
        let entries = REFERENCE_CODES
            .iter()
            .map(|&(code, name)| (ClassIndex(code), name.to_string()))
            .collect();
        Self { entries }
    }

    /// Build a table from `(code, name)` pairs.
    ///
    /// # Errors
    /// Returns `TableError` if there are no entries or a code repeats.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (code, name) in entries {
            if map.insert(ClassIndex(code), name.into()).is_some() {
                return Err(TableError::DuplicateCode(code));
            }
        }
        if map.is_empty() {
            return Err(TableError::Empty);
        }
        Ok(Self { entries: map })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, code: ClassIndex) -> bool {
        self.entries.contains_key(&code)
    }

    #[must_use]
    pub fn name_of(&self, code: ClassIndex) -> Option<&str> {
        self.entries.get(&code).map(String::as_str)
    }

    /// Reverse lookup by exact display name.
    #[must_use]
    pub fn code_of(&self, name: &str) -> Option<ClassIndex> {
        self.entries
            .iter()
            .find_map(|(code, n)| (n == name).then_some(*code))
    }

    /// All codes, ascending.
    pub fn codes(&self) -> impl Iterator<Item = ClassIndex> + '_ {
        self.entries.keys().copied()
    }
}

/// Disease name paired with the class code it came from.
///
/// Serializes to the `{"predicted_disease", "disease_code"}` response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "predicted_disease")]
    pub disease: String,

    #[serde(rename = "disease_code")]
    pub class_index: ClassIndex,
}

/// Map a class code to its disease name.
///
/// # Errors
/// Returns `DiagnosisError::UnknownClassCode` if the code is not in the table.
pub fn resolve(table: &DiseaseCodeTable, index: ClassIndex) -> Result<Prediction, DiagnosisError> {
    table
        .name_of(index)
        .map(|name| Prediction {
            disease: name.to_string(),
            class_index: index,
        })
        .ok_or(DiagnosisError::UnknownClassCode(index))
}
