//! Runtime configuration.
//!
//! Resolved once at process startup and then passed into services, so that
//! nothing on the request path reads process-wide environment variables.

use std::path::{Path, PathBuf};

use ed25519_dalek::VerifyingKey;

use crate::adapters::linear::signature::verifying_key_from_b64;
use crate::adapters::linear::ModelTrust;
use crate::MedrecError;

pub const MODEL_PATH_ENV: &str = "MEDREC_MODEL_PATH";
pub const DB_PATH_ENV: &str = "MEDREC_DB_PATH";
pub const RECORD_HISTORY_ENV: &str = "MEDREC_RECORD_HISTORY";
pub const PUBKEY_FILE_ENV: &str = "MEDREC_MODEL_SIGNING_PUBKEY_B64_FILE";
pub const DOCKER_SECRET_PUBKEY: &str = "/run/secrets/medrec_model_signing_pubkey_b64";
/// Honoured in debug builds only.
pub const PUBKEY_ENV: &str = "MEDREC_MODEL_SIGNING_PUBKEY_B64";
/// Honoured in debug builds only.
pub const ALLOW_UNSIGNED_ENV: &str = "MEDREC_ALLOW_UNSIGNED_MODELS";
pub const MODEL_MAX_AGE_ENV: &str = "MEDREC_MODEL_MAX_AGE_SECS";

const DEFAULT_MODEL_PATH: &str = "models";
const DEFAULT_DB_PATH: &str = "medrec.db";

/// Configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    model_path: PathBuf,
    db_path: PathBuf,
    record_history: bool,
    signing_key: Option<VerifyingKey>,
    allow_unsigned: bool,
    model_max_age_secs: Option<i64>,
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns `MedrecError::Config` for malformed values or an unreadable key.
    pub fn from_env() -> Result<Self, MedrecError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup` instead of the process environment.
    ///
    /// # Errors
    /// Returns `MedrecError::Config` for malformed values or an unreadable key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MedrecError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let model_path = get(MODEL_PATH_ENV).unwrap_or_else(|| DEFAULT_MODEL_PATH.into());
        let db_path = get(DB_PATH_ENV).unwrap_or_else(|| DEFAULT_DB_PATH.into());
        let record_history = get(RECORD_HISTORY_ENV)
            .map(|v| parse_flag(RECORD_HISTORY_ENV, &v))
            .transpose()?
            .unwrap_or(true);

        let model_max_age_secs = get(MODEL_MAX_AGE_ENV)
            .map(|v| {
                v.parse::<i64>().map_err(|_| {
                    MedrecError::Config(format!("{MODEL_MAX_AGE_ENV} must be an integer"))
                })
            })
            .transpose()?
            .filter(|&secs| secs > 0);

        let allow_unsigned = if cfg!(debug_assertions) {
            get(ALLOW_UNSIGNED_ENV)
                .map(|v| parse_flag(ALLOW_UNSIGNED_ENV, &v))
                .transpose()?
                .unwrap_or(false)
        } else {
            if get(ALLOW_UNSIGNED_ENV).is_some() {
                tracing::warn!("{ALLOW_UNSIGNED_ENV} is ignored in release builds");
            }
            false
        };

        let signing_key = resolve_signing_key(&get)?;

        Ok(Self {
            model_path: PathBuf::from(model_path),
            db_path: PathBuf::from(db_path),
            record_history,
            signing_key,
            allow_unsigned,
            model_max_age_secs,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn record_history(&self) -> bool {
        self.record_history
    }

    pub fn model_max_age_secs(&self) -> Option<i64> {
        self.model_max_age_secs
    }

    /// How the model directory must be verified.
    ///
    /// A configured key always wins over the unsigned override.
    ///
    /// # Errors
    /// Returns `MedrecError::Config` if no verifying key is configured and
    /// unsigned models are not allowed.
    pub fn model_trust(&self) -> Result<ModelTrust, MedrecError> {
        if let Some(key) = self.signing_key {
            return Ok(ModelTrust::Verify {
                key,
                max_age_secs: self.model_max_age_secs,
            });
        }
        if self.allow_unsigned {
            tracing::warn!("Model signature verification disabled ({ALLOW_UNSIGNED_ENV})");
            return Ok(ModelTrust::AllowUnsigned);
        }
        Err(MedrecError::Config(format!(
            "Missing model verifying key. Provide one of: {PUBKEY_FILE_ENV}, \
             {DOCKER_SECRET_PUBKEY} (env var {PUBKEY_ENV} only in debug builds)."
        )))
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, MedrecError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(MedrecError::Config(format!(
            "{name} must be a boolean (got {value:?})"
        ))),
    }
}

fn resolve_signing_key<G>(get: &G) -> Result<Option<VerifyingKey>, MedrecError>
where
    G: Fn(&str) -> Option<String>,
{
    let decode = |b64: &str, source: &str| {
        verifying_key_from_b64(b64)
            .map(Some)
            .map_err(|e| MedrecError::Config(format!("{source}: {e}")))
    };

    if let Some(path) = get(PUBKEY_FILE_ENV) {
        let b64 = std::fs::read_to_string(&path).map_err(|e| {
            MedrecError::Config(format!("Failed reading {PUBKEY_FILE_ENV} ({path}): {e}"))
        })?;
        return decode(&b64, PUBKEY_FILE_ENV);
    }

    if Path::new(DOCKER_SECRET_PUBKEY).exists() {
        let b64 = std::fs::read_to_string(DOCKER_SECRET_PUBKEY)
            .map_err(|e| MedrecError::Config(format!("Failed reading docker pubkey secret: {e}")))?;
        return decode(&b64, DOCKER_SECRET_PUBKEY);
    }

    if cfg!(debug_assertions) {
        if let Some(b64) = get(PUBKEY_ENV) {
            return decode(&b64, PUBKEY_ENV);
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn pubkey_b64(seed: u8) -> String {
        let key = ed25519_dalek::SigningKey::from_bytes(&[seed; 32]).verifying_key();
        base64::engine::general_purpose::STANDARD.encode(key.as_bytes())
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).expect("Should resolve");
        assert_eq!(config.model_path(), Path::new("models"));
        assert_eq!(config.db_path(), Path::new("medrec.db"));
        assert!(config.record_history());
        assert!(config.model_max_age_secs().is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            (MODEL_PATH_ENV, "/srv/model"),
            (DB_PATH_ENV, " /tmp/h.db "),
            (RECORD_HISTORY_ENV, "off"),
            (MODEL_MAX_AGE_ENV, "3600"),
        ]))
        .expect("Should resolve");
        assert_eq!(config.model_path(), Path::new("/srv/model"));
        assert_eq!(config.db_path(), Path::new("/tmp/h.db"));
        assert!(!config.record_history());
        assert_eq!(config.model_max_age_secs(), Some(3600));
    }

    #[test]
    fn test_malformed_values() {
        assert!(matches!(
            AppConfig::from_lookup(lookup(&[(RECORD_HISTORY_ENV, "maybe")])),
            Err(MedrecError::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&[(MODEL_MAX_AGE_ENV, "soon")])),
            Err(MedrecError::Config(_))
        ));
    }

    #[test]
    fn test_pubkey_from_file() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("pub.b64");
        std::fs::write(&path, format!("{}\n", pubkey_b64(9))).expect("Should write");

        let config = AppConfig::from_lookup(lookup(&[(
            PUBKEY_FILE_ENV,
            path.to_str().expect("UTF-8 path"),
        )]))
        .expect("Should resolve");
        assert!(matches!(
            config.model_trust(),
            Ok(ModelTrust::Verify { .. })
        ));
    }

    #[test]
    fn test_bad_pubkey_file() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("pub.b64");
        std::fs::write(&path, "not base64!").expect("Should write");

        let result = AppConfig::from_lookup(lookup(&[(
            PUBKEY_FILE_ENV,
            path.to_str().expect("UTF-8 path"),
        )]));
        assert!(matches!(result, Err(MedrecError::Config(_))));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_debug_overrides() {
        let b64 = pubkey_b64(4);
        let config =
            AppConfig::from_lookup(lookup(&[(PUBKEY_ENV, b64.as_str())])).expect("Should resolve");
        assert!(matches!(
            config.model_trust(),
            Ok(ModelTrust::Verify { .. })
        ));

        let config = AppConfig::from_lookup(lookup(&[(ALLOW_UNSIGNED_ENV, "1")]))
            .expect("Should resolve");
        assert!(matches!(config.model_trust(), Ok(ModelTrust::AllowUnsigned)));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        if Path::new(DOCKER_SECRET_PUBKEY).exists() {
            return;
        }
        let config = AppConfig::from_lookup(lookup(&[])).expect("Should resolve");
        assert!(matches!(config.model_trust(), Err(MedrecError::Config(_))));
    }
}
