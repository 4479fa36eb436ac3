//! Symptom vocabulary and one-hot feature encoding.
//!
//! The reference vocabulary matches the column order the classifier was
//! trained on. Several tokens carry stray spaces or punctuation; they are kept
//! byte-for-byte because the training data used them verbatim.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Number of slots in a reference feature vector.
pub const FEATURE_WIDTH: usize = 132;

/// Reference symptom vocabulary. Position in the array is the feature index.
pub const SYMPTOM_NAMES: [&str; FEATURE_WIDTH] = [
    "itching",
    "skin_rash",
    "nodal_skin_eruptions",
    "continuous_sneezing",
    "shivering",
    "chills",
    "joint_pain",
    "stomach_pain",
    "acidity",
    "ulcers_on_tongue",
    "muscle_wasting",
    "vomiting",
    "burning_micturition",
    "spotting_ urination",
    "fatigue",
    "weight_gain",
    "anxiety",
    "cold_hands_and_feets",
    "mood_swings",
    "weight_loss",
    "restlessness",
    "lethargy",
    "patches_in_throat",
    "irregular_sugar_level",
    "cough",
    "high_fever",
    "sunken_eyes",
    "breathlessness",
    "sweating",
    "dehydration",
    "indigestion",
    "headache",
    "yellowish_skin",
    "dark_urine",
    "nausea",
    "loss_of_appetite",
    "pain_behind_the_eyes",
    "back_pain",
    "constipation",
    "abdominal_pain",
    "diarrhoea",
    "mild_fever",
    "yellow_urine",
    "yellowing_of_eyes",
    "acute_liver_failure",
    "fluid_overload",
    "swelling_of_stomach",
    "swelled_lymph_nodes",
    "malaise",
    "blurred_and_distorted_vision",
    "phlegm",
    "throat_irritation",
    "redness_of_eyes",
    "sinus_pressure",
    "runny_nose",
    "congestion",
    "chest_pain",
    "weakness_in_limbs",
    "fast_heart_rate",
    "pain_during_bowel_movements",
    "pain_in_anal_region",
    "bloody_stool",
    "irritation_in_anus",
    "neck_pain",
    "dizziness",
    "cramps",
    "bruising",
    "obesity",
    "swollen_legs",
    "swollen_blood_vessels",
    "puffy_face_and_eyes",
    "enlarged_thyroid",
    "brittle_nails",
    "swollen_extremeties",
    "excessive_hunger",
    "extra_marital_contacts",
    "drying_and_tingling_lips",
    "slurred_speech",
    "knee_pain",
    "hip_joint_pain",
    "muscle_weakness",
    "stiff_neck",
    "swelling_joints",
    "movement_stiffness",
    "spinning_movements",
    "loss_of_balance",
    "unsteadiness",
    "weakness_of_one_body_side",
    "loss_of_smell",
    "bladder_discomfort",
    "foul_smell_of urine",
    "continuous_feel_of_urine",
    "passage_of_gases",
    "internal_itching",
    "toxic_look_(typhos)",
    "depression",
    "irritability",
    "muscle_pain",
    "altered_sensorium",
    "red_spots_over_body",
    "belly_pain",
    "abnormal_menstruation",
    "dischromic _patches",
    "watering_from_eyes",
    "increased_appetite",
    "polyuria",
    "family_history",
    "mucoid_sputum",
    "rusty_sputum",
    "lack_of_concentration",
    "visual_disturbances",
    "receiving_blood_transfusion",
    "receiving_unsterile_injections",
    "coma",
    "stomach_bleeding",
    "distention_of_abdomen",
    "history_of_alcohol_consumption",
    "fluid_overload.1",
    "blood_in_sputum",
    "prominent_veins_on_calf",
    "palpitations",
    "painful_walking",
    "pus_filled_pimples",
    "blackheads",
    "scurring",
    "skin_peeling",
    "silver_like_dusting",
    "small_dents_in_nails",
    "inflammatory_nails",
    "blister",
    "red_sore_around_nose",
    "yellow_crust_ooze",
];

/// Errors raised while building a vocabulary or code table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("Lookup table must contain at least one entry")]
    Empty,

    #[error("Duplicate symptom name in vocabulary: {0:?}")]
    DuplicateSymptom(String),

    #[error("Duplicate disease code in code table: {0}")]
    DuplicateCode(i64),
}

/// Ordered mapping from symptom name to feature index.
///
/// Every index in `0..len()` is owned by exactly one name.
#[derive(Debug, Clone)]
pub struct SymptomVocabulary {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl SymptomVocabulary {
    /// The 132-symptom reference vocabulary.
    #[must_use]
    pub fn reference() -> Self {
        let names: Vec<String> = SYMPTOM_NAMES.iter().map(|s| (*s).to_string()).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }

    /// Build a vocabulary from names in feature order.
    ///
    /// # Errors
    /// Returns `TableError` if the list is empty or repeats a name.
    pub fn from_names<I, S>(names: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(TableError::Empty);
        }

        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(TableError::DuplicateSymptom(name.clone()));
            }
        }

        Ok(Self { names, index })
    }

    /// Feature index for a symptom name, if known.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Symptom name at a feature index.
    #[must_use]
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Width of the feature vectors this vocabulary produces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Fixed-width presence/absence vector, one slot per vocabulary index.
///
/// Serialized as a plain list of slots; deserializing goes through
/// [`FeatureVector::from_bits`], so every slot is 0 or 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u8>", into = "Vec<u8>")]
pub struct FeatureVector {
    bits: Vec<u8>,
}

impl From<Vec<u8>> for FeatureVector {
    fn from(bits: Vec<u8>) -> Self {
        Self::from_bits(bits)
    }
}

impl From<FeatureVector> for Vec<u8> {
    fn from(vector: FeatureVector) -> Self {
        vector.bits
    }
}

impl FeatureVector {
    /// All-zero vector of the given width.
    #[must_use]
    pub fn zeros(width: usize) -> Self {
        Self {
            bits: vec![0; width],
        }
    }

    /// Wrap raw slot values. Any non-zero value is stored as 1.
    #[must_use]
    pub fn from_bits(bits: Vec<u8>) -> Self {
        Self {
            bits: bits.into_iter().map(|b| u8::from(b != 0)).collect(),
        }
    }

    /// Mark a slot present. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize) {
        if let Some(slot) = self.bits.get_mut(index) {
            *slot = 1;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Number of slots set to 1.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.bits.iter().filter(|&&b| b == 1).count()
    }

    /// Indices of slots set to 1, ascending.
    #[must_use]
    pub fn active_indices(&self) -> Vec<usize> {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| (b == 1).then_some(i))
            .collect()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bits
    }
}

/// Result of encoding a symptom list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    /// The one-hot vector handed to the classifier.
    pub vector: FeatureVector,

    /// Input names that are not in the vocabulary, in input order.
    ///
    /// These are skipped silently in the vector itself; an all-zero vector
    /// can mean "no symptoms" or "nothing recognised", and only this list
    /// tells the two apart.
    pub unrecognized: Vec<String>,
}

/// Encode symptom names into a one-hot feature vector.
///
/// Duplicates are idempotent and unknown names are skipped without error.
#[must_use]
pub fn encode<S: AsRef<str>>(vocabulary: &SymptomVocabulary, symptoms: &[S]) -> Encoding {
    let mut vector = FeatureVector::zeros(vocabulary.len());
    let mut unrecognized = Vec::new();

    for symptom in symptoms {
        let name = symptom.as_ref();
        match vocabulary.index_of(name) {
            Some(i) => vector.set(i),
            None => unrecognized.push(name.to_string()),
        }
    }

    Encoding {
        vector,
        unrecognized,
    }
}
