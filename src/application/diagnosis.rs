//! Diagnosis service: symptom list in, disease name and class code out.
//!
//! The pipeline is `encode → classify → resolve` with no caching, no retries
//! and no state carried between requests. Everything shared is read-only
//! after [`DiagnosisContext::new`], so a service can be called from many
//! threads at once without locking.

use std::sync::Arc;

use crate::adapters::StorageError;
use crate::domain::{
    self, ClassIndex, Diagnosis, DiagnosisError, DiagnosisOutcome, DiseaseCodeTable, Encoding,
    FeatureVector, Prediction, SymptomVocabulary,
};
use crate::ports::{Classifier, DiagnosisPage, Storage};
use crate::MedrecError;

/// Immutable tables and classifier, built once at startup.
pub struct DiagnosisContext {
    vocabulary: SymptomVocabulary,
    codes: DiseaseCodeTable,
    classifier: Arc<dyn Classifier>,
}

impl DiagnosisContext {
    /// Bind a vocabulary, a code table and a classifier together.
    ///
    /// # Errors
    /// Returns `MedrecError::Validation` if the classifier's input width
    /// differs from the vocabulary size.
    pub fn new(
        vocabulary: SymptomVocabulary,
        codes: DiseaseCodeTable,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, MedrecError> {
        let width = classifier.feature_width();
        if width != vocabulary.len() {
            return Err(MedrecError::Validation(format!(
                "Classifier expects {width} features but the vocabulary has {} symptoms",
                vocabulary.len()
            )));
        }

        // Not fatal: such codes only fail the requests that produce them.
        if let Some(classes) = classifier.classes() {
            let missing: Vec<String> = classes
                .iter()
                .filter(|c| !codes.contains(**c))
                .map(ToString::to_string)
                .collect();
            if !missing.is_empty() {
                tracing::warn!(
                    "Classifier can emit {} class code(s) missing from the disease table: {}",
                    missing.len(),
                    missing.join(", ")
                );
            }
        }

        tracing::info!(
            "Diagnosis context ready ({} symptoms, {} diseases)",
            vocabulary.len(),
            codes.len()
        );
        Ok(Self {
            vocabulary,
            codes,
            classifier,
        })
    }

    /// Context over the reference vocabulary and code table.
    ///
    /// # Errors
    /// See [`DiagnosisContext::new`].
    pub fn reference(classifier: Arc<dyn Classifier>) -> Result<Self, MedrecError> {
        Self::new(
            SymptomVocabulary::reference(),
            DiseaseCodeTable::reference(),
            classifier,
        )
    }

    #[must_use]
    pub fn vocabulary(&self) -> &SymptomVocabulary {
        &self.vocabulary
    }

    #[must_use]
    pub fn codes(&self) -> &DiseaseCodeTable {
        &self.codes
    }
}

/// Service running the diagnosis pipeline, with optional history.
pub struct DiagnosisService<S>
where
    S: Storage,
{
    context: Arc<DiagnosisContext>,
    history: Option<Arc<S>>,
}

impl<S> DiagnosisService<S>
where
    S: Storage,
    S::Error: Into<StorageError>,
{
    /// Create a service. Pass `None` to skip recording history.
    pub fn new(context: Arc<DiagnosisContext>, history: Option<Arc<S>>) -> Self {
        Self { context, history }
    }

    #[must_use]
    pub fn context(&self) -> &DiagnosisContext {
        &self.context
    }

    /// One-hot encode `symptoms`; unknown names are reported, not rejected.
    pub fn encode<T: AsRef<str>>(&self, symptoms: &[T]) -> Encoding {
        let encoding = domain::encode(&self.context.vocabulary, symptoms);
        if !encoding.unrecognized.is_empty() {
            tracing::warn!(
                "Skipped {} unrecognized symptom name(s): {}",
                encoding.unrecognized.len(),
                encoding.unrecognized.join(", ")
            );
        }
        tracing::debug!(
            "Encoded {} symptom(s) into {} active slot(s)",
            symptoms.len(),
            encoding.vector.active_count()
        );
        encoding
    }

    /// Run the classifier on a single vector.
    ///
    /// # Errors
    /// Returns `DiagnosisError::InvalidVectorShape` before calling the
    /// classifier if the width is wrong, or `DiagnosisError::Classifier` if
    /// the classifier fails or does not return exactly one class.
    pub fn classify(&self, vector: &FeatureVector) -> Result<ClassIndex, DiagnosisError> {
        let expected = self.context.classifier.feature_width();
        if vector.len() != expected {
            return Err(DiagnosisError::InvalidVectorShape {
                expected,
                actual: vector.len(),
            });
        }

        let mut classes = self
            .context
            .classifier
            .predict(std::slice::from_ref(vector))
            .map_err(|e| DiagnosisError::Classifier(e.to_string()))?;

        match classes.len() {
            1 => Ok(classes.remove(0)),
            n => Err(DiagnosisError::Classifier(format!(
                "expected 1 class for a single-row batch, got {n}"
            ))),
        }
    }

    /// Map a class code to its disease name.
    ///
    /// # Errors
    /// Returns `DiagnosisError::UnknownClassCode` if the code is not in the table.
    pub fn resolve(&self, index: ClassIndex) -> Result<Prediction, DiagnosisError> {
        domain::resolve(&self.context.codes, index)
    }

    /// Run the full pipeline for one request.
    ///
    /// An empty or entirely unrecognized list still reaches the classifier
    /// as an all-zero vector.
    ///
    /// # Errors
    /// Returns `MedrecError::Diagnosis` if classification or resolution fails.
    /// History failures are logged and do not fail the request.
    pub fn diagnose<T: AsRef<str>>(&self, symptoms: &[T]) -> Result<DiagnosisOutcome, MedrecError> {
        let encoding = self.encode(symptoms);
        let class = self.classify(&encoding.vector)?;
        let prediction = self.resolve(class).map_err(|e| {
            tracing::error!("{e}");
            e
        })?;

        let outcome = DiagnosisOutcome {
            prediction,
            unrecognized: encoding.unrecognized,
        };

        if let Some(history) = &self.history {
            let input = symptoms.iter().map(|s| s.as_ref().to_string()).collect();
            if let Err(e) = history.save_diagnosis(&Diagnosis::new(input, &outcome)) {
                let e: StorageError = e.into();
                tracing::warn!("Failed to record diagnosis: {e}");
            }
        }

        tracing::info!(
            "Diagnosis complete: disease={:?}, code={}",
            outcome.prediction.disease,
            outcome.prediction.class_index
        );
        Ok(outcome)
    }

    fn history(&self) -> Result<&S, MedrecError> {
        self.history
            .as_deref()
            .ok_or_else(|| MedrecError::Validation("Diagnosis history is disabled".into()))
    }

    /// Most recent diagnoses, newest first.
    ///
    /// # Errors
    /// Returns error if history is disabled or the storage operation fails.
    pub fn recent_diagnoses(&self, limit: usize) -> Result<Vec<Diagnosis>, MedrecError> {
        self.history()?
            .load_recent_diagnoses(limit)
            .map_err(|e| MedrecError::Storage(e.into()))
    }

    /// One page of history.
    ///
    /// # Errors
    /// Returns error if history is disabled or the storage operation fails.
    pub fn diagnosis_page(&self, offset: usize, limit: usize) -> Result<DiagnosisPage, MedrecError> {
        self.history()?
            .load_diagnoses_paginated(offset, limit)
            .map_err(|e| MedrecError::Storage(e.into()))
    }

    /// Number of recorded diagnoses.
    ///
    /// # Errors
    /// Returns error if history is disabled or the storage operation fails.
    pub fn diagnosis_count(&self) -> Result<usize, MedrecError> {
        self.history()?
            .count_diagnoses()
            .map_err(|e| MedrecError::Storage(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteStorage;
    use crate::domain::FEATURE_WIDTH;
    use crate::ports::ClassifierError;
    use std::sync::Mutex;

    /// Returns a fixed class and remembers every batch it saw.
    struct RecordingClassifier {
        width: usize,
        answer: Vec<ClassIndex>,
        seen: Mutex<Vec<Vec<FeatureVector>>>,
    }

    impl RecordingClassifier {
        fn new(answer: i64) -> Self {
            Self {
                width: FEATURE_WIDTH,
                answer: vec![ClassIndex(answer)],
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<FeatureVector>> {
            self.seen.lock().expect("Lock").clone()
        }
    }

    impl Classifier for RecordingClassifier {
        fn feature_width(&self) -> usize {
            self.width
        }

        fn predict(&self, batch: &[FeatureVector]) -> Result<Vec<ClassIndex>, ClassifierError> {
            self.seen.lock().expect("Lock").push(batch.to_vec());
            Ok(self.answer.clone())
        }
    }

    fn service_with(
        classifier: Arc<RecordingClassifier>,
        history: Option<Arc<SqliteStorage>>,
    ) -> DiagnosisService<SqliteStorage> {
        let context = DiagnosisContext::reference(classifier).expect("Should build context");
        DiagnosisService::new(Arc::new(context), history)
    }

    #[test]
    fn test_diagnose_end_to_end() {
        let classifier = Arc::new(RecordingClassifier::new(15));
        let service = service_with(classifier.clone(), None);

        let outcome = service
            .diagnose(&["itching", "skin_rash"])
            .expect("Should diagnose");
        assert_eq!(outcome.prediction.disease, "Fungal infection");
        assert_eq!(outcome.prediction.class_index, ClassIndex(15));
        assert!(outcome.unrecognized.is_empty());

        let calls = classifier.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 1, "single-row batch");
        assert_eq!(calls[0][0].len(), FEATURE_WIDTH);
        assert_eq!(calls[0][0].active_indices(), vec![0, 1]);
    }

    #[test]
    fn test_empty_input_still_classifies() {
        let classifier = Arc::new(RecordingClassifier::new(4));
        let service = service_with(classifier.clone(), None);

        let outcome = service.diagnose::<&str>(&[]).expect("Should diagnose");
        assert_eq!(outcome.prediction.disease, "Allergy");
        assert_eq!(classifier.calls()[0][0], FeatureVector::zeros(FEATURE_WIDTH));
    }

    #[test]
    fn test_unknown_symptom_is_ignored() {
        let classifier = Arc::new(RecordingClassifier::new(4));
        let service = service_with(classifier.clone(), None);

        let outcome = service
            .diagnose(&["not_a_real_symptom"])
            .expect("Should diagnose");
        assert_eq!(outcome.unrecognized, vec!["not_a_real_symptom"]);
        assert_eq!(classifier.calls()[0][0].active_count(), 0);
    }

    #[test]
    fn test_unknown_class_code_is_reported() {
        let service = service_with(Arc::new(RecordingClassifier::new(999)), None);

        let err = service.diagnose(&["cough"]).unwrap_err();
        assert!(matches!(
            err,
            MedrecError::Diagnosis(DiagnosisError::UnknownClassCode(ClassIndex(999)))
        ));

        // The failure leaves the service usable.
        assert!(service.diagnose(&["cough"]).is_err());
        assert!(service.encode(&["cough"]).unrecognized.is_empty());
    }

    #[test]
    fn test_classify_rejects_wrong_width_before_calling() {
        let classifier = Arc::new(RecordingClassifier::new(15));
        let service = service_with(classifier.clone(), None);

        let err = service.classify(&FeatureVector::zeros(131)).unwrap_err();
        assert_eq!(
            err,
            DiagnosisError::InvalidVectorShape {
                expected: FEATURE_WIDTH,
                actual: 131
            }
        );
        assert!(classifier.calls().is_empty());
    }

    #[test]
    fn test_classify_requires_exactly_one_answer() {
        let classifier = Arc::new(RecordingClassifier {
            answer: vec![ClassIndex(15), ClassIndex(4)],
            ..RecordingClassifier::new(15)
        });
        let service = service_with(classifier, None);

        let err = service
            .classify(&FeatureVector::zeros(FEATURE_WIDTH))
            .unwrap_err();
        assert!(matches!(err, DiagnosisError::Classifier(_)));
    }

    #[test]
    fn test_context_rejects_width_mismatch() {
        let classifier = Arc::new(RecordingClassifier {
            width: 10,
            ..RecordingClassifier::new(15)
        });
        assert!(matches!(
            DiagnosisContext::reference(classifier),
            Err(MedrecError::Validation(_))
        ));
    }

    #[test]
    fn test_history_records_outcome() {
        let storage = Arc::new(SqliteStorage::in_memory().expect("Should create db"));
        let service = service_with(Arc::new(RecordingClassifier::new(29)), Some(storage));

        service
            .diagnose(&["chills", "vomiting", "made_up"])
            .expect("Should diagnose");

        assert_eq!(service.diagnosis_count().expect("Should count"), 1);
        let recent = service.recent_diagnoses(5).expect("Should load");
        assert_eq!(recent[0].prediction.disease, "Malaria");
        assert_eq!(recent[0].symptoms, vec!["chills", "vomiting", "made_up"]);
        assert_eq!(recent[0].unrecognized, vec!["made_up"]);
    }

    #[test]
    fn test_history_disabled() {
        let service = service_with(Arc::new(RecordingClassifier::new(29)), None);
        assert!(matches!(
            service.diagnosis_count(),
            Err(MedrecError::Validation(_))
        ));
    }

    #[test]
    fn test_parallel_requests_share_context() {
        let service = Arc::new(service_with(Arc::new(RecordingClassifier::new(10)), None));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || service.diagnose(&["cough", "runny_nose"]))
            })
            .collect();

        for handle in handles {
            let outcome = handle.join().expect("Thread").expect("Should diagnose");
            assert_eq!(outcome.prediction.disease, "Common Cold");
        }
    }
}
