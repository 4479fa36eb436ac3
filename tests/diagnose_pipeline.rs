//! End-to-end: signed model on disk through to a resolved disease name.

use std::sync::Arc;

use ed25519_dalek::SigningKey;

use medrec::adapters::linear::signature::sign_model_dir;
use medrec::adapters::linear::{DecisionScheme, LinearClassifier, LinearModel, ModelTrust, MODEL_FILE};
use medrec::adapters::sqlite::SqliteStorage;
use medrec::application::{DiagnosisContext, DiagnosisService};
use medrec::domain::{ClassIndex, DiagnosisError, FeatureVector, SymptomVocabulary, FEATURE_WIDTH};
use medrec::MedrecError;

/// Three one-vs-rest rows: Fungal infection (15) on itching + skin_rash,
/// Allergy (4) by intercept, and code 999 (not in the table) on cough.
fn demo_model() -> LinearModel {
    let vocabulary = SymptomVocabulary::reference();
    let mut fungal = vec![0.0; FEATURE_WIDTH];
    fungal[0] = 1.0;
    fungal[1] = 1.0;
    let mut unknown = vec![0.0; FEATURE_WIDTH];
    unknown[vocabulary.index_of("cough").expect("cough in vocabulary")] = 5.0;

    LinearModel {
        format_version: 1,
        n_features: FEATURE_WIDTH,
        decision: DecisionScheme::Ovr,
        classes: vec![15, 4, 999],
        coefficients: vec![fungal, vec![0.0; FEATURE_WIDTH], unknown],
        intercepts: vec![0.0, 0.5, 0.0],
    }
}

fn service_from_signed_dir(
    history: Option<Arc<SqliteStorage>>,
) -> (tempfile::TempDir, DiagnosisService<SqliteStorage>) {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    std::fs::write(
        dir.path().join(MODEL_FILE),
        serde_json::to_vec(&demo_model()).expect("Should serialize"),
    )
    .expect("Should write model");

    let key = SigningKey::from_bytes(&[21; 32]);
    sign_model_dir(dir.path(), &key, Some(1)).expect("Should sign");

    let trust = ModelTrust::Verify {
        key: key.verifying_key(),
        max_age_secs: Some(3600),
    };
    let classifier = LinearClassifier::load(dir.path(), &trust).expect("Should load");
    let context = DiagnosisContext::reference(Arc::new(classifier)).expect("Should build context");
    (dir, DiagnosisService::new(Arc::new(context), history))
}

#[test]
fn known_symptoms_encode_and_resolve() {
    let (_dir, service) = service_from_signed_dir(None);

    let encoding = service.encode(&["itching", "skin_rash"]);
    assert_eq!(encoding.vector.len(), FEATURE_WIDTH);
    assert_eq!(encoding.vector.active_indices(), vec![0, 1]);

    let outcome = service
        .diagnose(&["itching", "skin_rash"])
        .expect("Should diagnose");
    assert_eq!(outcome.prediction.disease, "Fungal infection");
    assert_eq!(outcome.prediction.class_index, ClassIndex(15));
    assert_eq!(
        serde_json::to_value(&outcome).expect("Should serialize"),
        serde_json::json!({"predicted_disease": "Fungal infection", "disease_code": 15})
    );
}

#[test]
fn empty_and_unknown_inputs_still_classify() {
    let (_dir, service) = service_from_signed_dir(None);

    let empty = service.diagnose::<&str>(&[]).expect("Should diagnose");
    assert_eq!(empty.prediction.disease, "Allergy");

    let unknown = service
        .diagnose(&["not_a_real_symptom"])
        .expect("Should diagnose");
    assert_eq!(unknown.prediction, empty.prediction);
    assert_eq!(unknown.unrecognized, vec!["not_a_real_symptom"]);
}

#[test]
fn duplicates_do_not_change_the_vector() {
    let (_dir, service) = service_from_signed_dir(None);
    assert_eq!(
        service.encode(&["itching", "itching"]).vector,
        service.encode(&["itching"]).vector
    );
}

#[test]
fn unknown_class_code_is_an_error() {
    let (_dir, service) = service_from_signed_dir(None);

    let err = service.diagnose(&["cough"]).unwrap_err();
    assert!(matches!(
        err,
        MedrecError::Diagnosis(DiagnosisError::UnknownClassCode(ClassIndex(999)))
    ));

    // Later requests are unaffected.
    let outcome = service.diagnose(&["itching"]).expect("Should diagnose");
    assert_eq!(outcome.prediction.class_index, ClassIndex(15));
}

#[test]
fn wrong_width_vector_is_rejected() {
    let (_dir, service) = service_from_signed_dir(None);
    assert_eq!(
        service.classify(&FeatureVector::zeros(FEATURE_WIDTH - 1)),
        Err(DiagnosisError::InvalidVectorShape {
            expected: FEATURE_WIDTH,
            actual: FEATURE_WIDTH - 1
        })
    );
}

#[test]
fn tampered_model_fails_to_load() {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let model_path = dir.path().join(MODEL_FILE);
    std::fs::write(&model_path, serde_json::to_vec(&demo_model()).expect("Should serialize"))
        .expect("Should write model");

    let key = SigningKey::from_bytes(&[21; 32]);
    sign_model_dir(dir.path(), &key, None).expect("Should sign");

    let mut tampered = demo_model();
    tampered.intercepts[2] = 100.0;
    std::fs::write(&model_path, serde_json::to_vec(&tampered).expect("Should serialize"))
        .expect("Should overwrite model");

    let trust = ModelTrust::Verify {
        key: key.verifying_key(),
        max_age_secs: None,
    };
    assert!(LinearClassifier::load(dir.path(), &trust).is_err());
}

#[test]
fn history_is_recorded() {
    let storage = Arc::new(SqliteStorage::in_memory().expect("Should create db"));
    let (_dir, service) = service_from_signed_dir(Some(storage));

    service.diagnose(&["itching"]).expect("Should diagnose");
    service.diagnose::<&str>(&[]).expect("Should diagnose");
    assert!(service.diagnose(&["cough"]).is_err());

    assert_eq!(service.diagnosis_count().expect("Should count"), 2);
    let page = service.diagnosis_page(0, 1).expect("Should page");
    assert_eq!(page.items.len(), 1);
    assert!(page.has_more);
}
