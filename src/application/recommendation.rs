//! Recommendation service: descriptive information for a predicted disease.
//!
//! Profiles are keyed by the exact disease name the code table produces,
//! including any trailing whitespace the reference names carry.

use std::path::Path;
use std::sync::Arc;

use crate::adapters::StorageError;
use crate::domain::{DiseaseCodeTable, DiseaseProfile};
use crate::ports::ReferenceStore;
use crate::MedrecError;

/// Service over a `ReferenceStore`.
pub struct RecommendationService<R>
where
    R: ReferenceStore,
{
    store: Arc<R>,
}

impl<R> RecommendationService<R>
where
    R: ReferenceStore,
    R::Error: Into<StorageError>,
{
    pub fn new(store: Arc<R>) -> Self {
        Self { store }
    }

    /// Profile stored under `disease`, if any.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    pub fn profile_for(&self, disease: &str) -> Result<Option<DiseaseProfile>, MedrecError> {
        let profile = self
            .store
            .load_profile(disease)
            .map_err(|e| MedrecError::Storage(e.into()))?;
        if profile.is_none() {
            tracing::debug!("No reference profile for {disease:?}");
        }
        Ok(profile)
    }

    /// Normalize and store `profiles`, replacing existing entries by name.
    ///
    /// # Errors
    /// Returns `MedrecError::Validation` for a profile with a blank disease
    /// name (nothing is stored in that case), or a storage error.
    pub fn import_profiles(&self, profiles: Vec<DiseaseProfile>) -> Result<usize, MedrecError> {
        if let Some(pos) = profiles.iter().position(|p| p.disease.trim().is_empty()) {
            return Err(MedrecError::Validation(format!(
                "Profile #{pos} has an empty disease name"
            )));
        }

        let count = profiles.len();
        for profile in profiles {
            self.store
                .save_profile(&profile.normalized())
                .map_err(|e| MedrecError::Storage(e.into()))?;
        }

        tracing::info!("Imported {count} disease profile(s)");
        Ok(count)
    }

    /// Read a JSON array of profiles from `path`.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a profile array.
    pub fn load_profiles_json(path: &Path) -> Result<Vec<DiseaseProfile>, MedrecError> {
        let content = std::fs::read_to_string(path)?;
        let profiles: Vec<DiseaseProfile> = serde_json::from_str(&content)?;
        tracing::debug!("Read {} profile(s) from {:?}", profiles.len(), path);
        Ok(profiles)
    }

    /// Names of all stored profiles.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    pub fn diseases(&self) -> Result<Vec<String>, MedrecError> {
        self.store
            .list_diseases()
            .map_err(|e| MedrecError::Storage(e.into()))
    }

    /// Stored profiles whose name no class code resolves to.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    pub fn unmatched_profiles(&self, codes: &DiseaseCodeTable) -> Result<Vec<String>, MedrecError> {
        let known: std::collections::HashSet<&str> = codes
            .codes()
            .filter_map(|c| codes.name_of(c))
            .collect();
        Ok(self
            .diseases()?
            .into_iter()
            .filter(|d| !known.contains(d.as_str()))
            .collect())
    }
}
