//! Descriptive reference data attached to a disease.

use serde::{Deserialize, Serialize};

/// Auxiliary information shown alongside a prediction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseProfile {
    /// Display name, matched exactly against the disease code table.
    pub disease: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub symptoms: Vec<String>,

    #[serde(default)]
    pub medications: Vec<String>,

    #[serde(default)]
    pub precautions: Vec<String>,

    #[serde(default)]
    pub diets: Vec<String>,

    #[serde(default)]
    pub workouts: Vec<String>,
}

impl DiseaseProfile {
    #[must_use]
    pub fn new(disease: impl Into<String>) -> Self {
        Self {
            disease: disease.into(),
            ..Self::default()
        }
    }

    /// Drop blank entries and repeated list items, keeping first occurrence.
    ///
    /// The disease name is left untouched.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        for list in [
            &mut self.symptoms,
            &mut self.medications,
            &mut self.precautions,
            &mut self.diets,
            &mut self.workouts,
        ] {
            dedup_non_blank(list);
        }
        self
    }
}

fn dedup_non_blank(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| {
        let trimmed = item.trim();
        !trimmed.is_empty() && seen.insert(trimmed.to_string())
    });
    for item in items.iter_mut() {
        *item = item.trim().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_dedups_and_drops_blanks() {
        let profile = DiseaseProfile {
            disease: "Diabetes ".into(),
            description: Some("  ".into()),
            symptoms: vec![
                "fatigue".into(),
                "weight_loss".into(),
                " fatigue".into(),
                String::new(),
            ],
            precautions: vec!["exercise".into(), "exercise".into()],
            ..DiseaseProfile::default()
        }
        .normalized();

        assert_eq!(profile.disease, "Diabetes ");
        assert_eq!(profile.description, None);
        assert_eq!(profile.symptoms, vec!["fatigue", "weight_loss"]);
        assert_eq!(profile.precautions, vec!["exercise"]);
    }

    #[test]
    fn test_missing_fields_default_on_deserialize() {
        let profile: DiseaseProfile =
            serde_json::from_str(r#"{"disease": "Malaria", "diets": ["Light meals"]}"#)
                .expect("Should parse");
        assert_eq!(profile.diets, vec!["Light meals"]);
        assert!(profile.medications.is_empty());
    }
}
