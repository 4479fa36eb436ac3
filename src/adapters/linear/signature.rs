//! Signed model manifests.
//!
//! A model directory is trusted only if `manifest.json` carries a valid
//! Ed25519 signature (`model.sig`) and every file it lists hashes to the
//! recorded SHA-256 digest. The signing side lives here too so that the
//! `sign_model` binary and the loader agree on one manifest format.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};

use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ModelError;

pub const MODEL_FILE: &str = "model.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SIGNATURE_FILE: &str = "model.sig";

const MANIFEST_VERSION: u32 = 1;

/// Allowed clock skew for `created_at` (5 minutes).
const MAX_FUTURE_SKEW_SECS: i64 = 300;

/// How much to trust a model directory.
#[derive(Debug, Clone)]
pub enum ModelTrust {
    /// Require a manifest signed by `key`, optionally no older than `max_age_secs`.
    Verify {
        key: VerifyingKey,
        max_age_secs: Option<i64>,
    },
    /// Skip signature checks. Honoured in debug builds only.
    AllowUnsigned,
}

/// A manifest that passed verification, with the `model.json` bytes it was
/// checked against.
#[derive(Debug, Clone)]
pub struct VerifiedModel {
    pub manifest: SignedModelManifest,
    /// Parse these, not a fresh read of the file.
    pub model_bytes: Vec<u8>,
}

/// Content of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedModelManifest {
    pub version: u32,
    /// Monotonic serial, e.g. a CI build number.
    pub serial: u64,
    /// Unix timestamp (seconds) of signing.
    pub created_at: i64,
    /// Random 16-byte nonce, base64.
    pub nonce_b64: String,
    /// Relative file name to lowercase SHA-256 hex.
    pub files: BTreeMap<String, String>,
}

pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// Constant-time compare for ASCII hex digests.
fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn validate_nonce_b64(nonce_b64: &str) -> Result<(), ModelError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(nonce_b64.trim())
        .map_err(|e| ModelError::Manifest(format!("Invalid nonce base64: {e}")))?;
    if raw.len() != 16 {
        return Err(ModelError::Manifest(
            "nonce must decode to exactly 16 bytes".into(),
        ));
    }
    Ok(())
}

/// Manifest entries must stay inside the model directory.
fn is_plain_relative(rel: &str) -> bool {
    let path = Path::new(rel);
    !rel.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Decode a base64 Ed25519 public key.
///
/// # Errors
/// Returns `ModelError::Signature` if the input is not a valid 32-byte key.
pub fn verifying_key_from_b64(b64: &str) -> Result<VerifyingKey, ModelError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|_| ModelError::Signature("Invalid public key base64".into()))?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| ModelError::Signature("Invalid public key length (expected 32 bytes)".into()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| ModelError::Signature("Invalid verifying key".into()))
}

/// Verify the manifest and signature in `base_dir` against `key`.
///
/// Each bound file is read once; the returned `model_bytes` are the exact
/// bytes whose digest matched.
///
/// # Errors
/// Returns `ModelError` if the signature is missing or invalid, the manifest
/// is malformed or stale, or any bound file does not match its digest.
pub fn verify_manifest(
    base_dir: &Path,
    key: &VerifyingKey,
    max_age_secs: Option<i64>,
) -> Result<VerifiedModel, ModelError> {
    let sig_path = base_dir.join(SIGNATURE_FILE);
    let manifest_path = base_dir.join(MANIFEST_FILE);

    if !sig_path.exists() || !manifest_path.exists() {
        tracing::error!("Model signature not found at {:?}", sig_path);
        return Err(ModelError::Signature(format!(
            "{SIGNATURE_FILE} and {MANIFEST_FILE} are required in {base_dir:?}"
        )));
    }

    let sig_bytes = fs::read(&sig_path)
        .map_err(|e| ModelError::Io(format!("Failed to read signature: {e}")))?;
    let sig_bytes: [u8; 64] = sig_bytes
        .as_slice()
        .try_into()
        .map_err(|_| ModelError::Signature("Invalid signature length (expected 64 bytes)".into()))?;
    let signature = Signature::from_bytes(&sig_bytes);

    let manifest_content = fs::read(&manifest_path)
        .map_err(|e| ModelError::Io(format!("Failed to read manifest: {e}")))?;
    key.verify(&manifest_content, &signature)
        .map_err(|_| ModelError::Signature("Invalid model signature".into()))?;

    let manifest: SignedModelManifest = serde_json::from_slice(&manifest_content)
        .map_err(|e| ModelError::Manifest(format!("Invalid {MANIFEST_FILE} format: {e}")))?;
    if manifest.version != MANIFEST_VERSION {
        return Err(ModelError::Manifest(format!(
            "Unsupported manifest version: {}",
            manifest.version
        )));
    }
    validate_nonce_b64(&manifest.nonce_b64)?;

    let now = unix_now();
    if manifest.created_at > now + MAX_FUTURE_SKEW_SECS {
        return Err(ModelError::Manifest(
            "manifest created_at is in the future".into(),
        ));
    }
    if let Some(max_age) = max_age_secs.filter(|&m| m > 0) {
        if now.saturating_sub(manifest.created_at) > max_age {
            return Err(ModelError::Manifest(
                "manifest is older than allowed max age".into(),
            ));
        }
    }

    if !manifest.files.contains_key(MODEL_FILE) {
        return Err(ModelError::Manifest(format!(
            "{MANIFEST_FILE} must bind {MODEL_FILE}"
        )));
    }

    let mut model_bytes = None;
    for (rel, expected_hex) in &manifest.files {
        if !is_plain_relative(rel) {
            return Err(ModelError::Manifest(format!(
                "Manifest entry escapes the model directory: {rel}"
            )));
        }
        let path = base_dir.join(rel);
        let bytes = fs::read(&path).map_err(|e| {
            ModelError::Io(format!(
                "Manifest references missing/unreadable file {path:?}: {e}"
            ))
        })?;
        if !constant_time_eq_str(&sha256_hex(&bytes), &expected_hex.to_ascii_lowercase()) {
            return Err(ModelError::Signature(format!("File hash mismatch for {rel}")));
        }
        if rel == MODEL_FILE {
            model_bytes = Some(bytes);
        }
    }
    let model_bytes = model_bytes.ok_or_else(|| {
        ModelError::Manifest(format!("{MANIFEST_FILE} must bind {MODEL_FILE}"))
    })?;

    tracing::info!(
        "Model signature verified (serial={}, files={})",
        manifest.serial,
        manifest.files.len()
    );
    Ok(VerifiedModel {
        manifest,
        model_bytes,
    })
}

/// Write `manifest.json` and `model.sig` for the model files in `model_dir`.
///
/// `serial` defaults to the signing timestamp.
///
/// # Errors
/// Returns `ModelError` if `model.json` is missing or any file cannot be written.
pub fn sign_model_dir(
    model_dir: &Path,
    signing_key: &SigningKey,
    serial: Option<u64>,
) -> Result<SignedModelManifest, ModelError> {
    let model_path = model_dir.join(MODEL_FILE);
    let model_bytes = fs::read(&model_path)
        .map_err(|e| ModelError::Io(format!("Failed to read {model_path:?}: {e}")))?;

    let mut files = BTreeMap::new();
    files.insert(MODEL_FILE.to_string(), sha256_hex(&model_bytes));

    let mut nonce = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let created_at = unix_now();
    let manifest = SignedModelManifest {
        version: MANIFEST_VERSION,
        serial: serial.unwrap_or_else(|| created_at.max(1) as u64),
        created_at,
        nonce_b64: base64::engine::general_purpose::STANDARD.encode(nonce),
        files,
    };

    let manifest_bytes = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| ModelError::Manifest(format!("Failed to serialize manifest: {e}")))?;
    fs::write(model_dir.join(MANIFEST_FILE), &manifest_bytes)
        .map_err(|e| ModelError::Io(format!("Failed to write {MANIFEST_FILE}: {e}")))?;

    let signature: Signature = signing_key.sign(&manifest_bytes);
    fs::write(model_dir.join(SIGNATURE_FILE), signature.to_bytes())
        .map_err(|e| ModelError::Io(format!("Failed to write {SIGNATURE_FILE}: {e}")))?;

    Ok(manifest)
}
