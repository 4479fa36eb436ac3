//! Storage port: persistence for diagnosis history.

use crate::domain::Diagnosis;

/// A page of diagnoses with pagination metadata.
#[derive(Debug, Clone)]
pub struct DiagnosisPage {
    /// Diagnoses in this page, newest first
    pub items: Vec<Diagnosis>,
    /// Total count of all stored diagnoses
    pub total_count: usize,
    /// Current page offset
    pub offset: usize,
    /// Page size limit
    pub limit: usize,
    /// Whether there are more pages
    pub has_more: bool,
}

impl DiagnosisPage {
    #[must_use]
    pub fn new(items: Vec<Diagnosis>, total_count: usize, offset: usize, limit: usize) -> Self {
        let has_more = offset + items.len() < total_count;
        Self {
            items,
            total_count,
            offset,
            limit,
            has_more,
        }
    }

    /// Offset of the next page, if any.
    #[must_use]
    pub fn next_offset(&self) -> Option<usize> {
        self.has_more.then_some(self.offset + self.limit)
    }

    /// Offset of the previous page, if any.
    #[must_use]
    pub fn prev_offset(&self) -> Option<usize> {
        (self.offset > 0).then(|| self.offset.saturating_sub(self.limit))
    }
}

/// Local diagnosis history.
pub trait Storage: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Save a diagnosis.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn save_diagnosis(&self, diagnosis: &Diagnosis) -> Result<(), Self::Error>;

    /// Load recent diagnoses (up to `limit`), newest first.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn load_recent_diagnoses(&self, limit: usize) -> Result<Vec<Diagnosis>, Self::Error>;

    /// Load diagnoses with offset pagination.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn load_diagnoses_paginated(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<DiagnosisPage, Self::Error>;

    /// Total number of stored diagnoses.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn count_diagnoses(&self) -> Result<usize, Self::Error>;

    /// Delete a diagnosis by ID.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn delete_diagnosis(&self, id: &str) -> Result<(), Self::Error>;

    /// Remove every stored diagnosis.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn clear_history(&self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offsets() {
        let middle = DiagnosisPage::new(Vec::new(), 25, 10, 10);
        assert!(middle.has_more);
        assert_eq!(middle.next_offset(), Some(20));
        assert_eq!(middle.prev_offset(), Some(0));

        let past_end = DiagnosisPage::new(Vec::new(), 25, 30, 10);
        assert!(!past_end.has_more);
        assert_eq!(past_end.next_offset(), None);
        assert_eq!(past_end.prev_offset(), Some(20));

        let first = DiagnosisPage::new(Vec::new(), 0, 0, 10);
        assert_eq!(first.prev_offset(), None);
    }
}
