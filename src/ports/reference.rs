//! Reference store port: descriptive tables keyed by disease name.

use crate::domain::DiseaseProfile;

/// Read/write access to auxiliary disease information.
pub trait ReferenceStore: Send + Sync {
    /// Error type for reference operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert or replace the profile for `profile.disease`.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn save_profile(&self, profile: &DiseaseProfile) -> Result<(), Self::Error>;

    /// Load the profile for an exact disease name.
    ///
    /// # Returns
    /// `None` if no profile is stored under that name.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn load_profile(&self, disease: &str) -> Result<Option<DiseaseProfile>, Self::Error>;

    /// Names of all diseases with a stored profile, sorted.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn list_diseases(&self) -> Result<Vec<String>, Self::Error>;
}
