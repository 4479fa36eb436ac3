//! SQLite adapter: Implementation of `Storage` and `ReferenceStore`.
//!
//! Provides local persistence for diagnosis history and the descriptive
//! disease tables. List-valued columns are stored as JSON text.
//!
//! # Mutex Behavior
//!
//! The connection is protected by a `Mutex`. A poisoned mutex surfaces as
//! `StorageError::Poisoned` instead of a panic.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{ClassIndex, Diagnosis, DiseaseProfile, Prediction};
use crate::ports::{DiagnosisPage, ReferenceStore, Storage};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Database connection lock poisoned")]
    Poisoned,
}

/// SQLite storage adapter.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

/// Raw `diagnoses` columns, decoded outside the rusqlite row closure.
type DiagnosisRow = (String, String, String, String, i64, String);

/// SQLite integers are signed; reject values that would wrap.
fn sql_int(name: &str, value: usize) -> Result<i64, StorageError> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidQuery(format!("{name} {value} is out of range")))
}

const DIAGNOSIS_COLUMNS: &str =
    "id, symptoms_json, unrecognized_json, disease, class_index, created_at";

impl SqliteStorage {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS diagnoses (
                id TEXT PRIMARY KEY,
                symptoms_json TEXT NOT NULL,
                unrecognized_json TEXT NOT NULL,
                disease TEXT NOT NULL,
                class_index INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_diagnoses_created
                ON diagnoses(created_at DESC);

            CREATE TABLE IF NOT EXISTS disease_profiles (
                disease TEXT PRIMARY KEY,
                profile_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<DiagnosisRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn decode_row(
        (id, symptoms_json, unrecognized_json, disease, class_index, created_at): DiagnosisRow,
    ) -> Result<Diagnosis, StorageError> {
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|e| {
                tracing::warn!("Diagnosis {id} has unreadable timestamp: {e}");
                chrono::DateTime::<chrono::Utc>::default()
            });

        Ok(Diagnosis {
            symptoms: serde_json::from_str(&symptoms_json)?,
            unrecognized: serde_json::from_str(&unrecognized_json)?,
            prediction: Prediction {
                disease,
                class_index: ClassIndex(class_index),
            },
            created_at,
            id,
        })
    }
}

impl Storage for SqliteStorage {
    type Error = StorageError;

    fn save_diagnosis(&self, diagnosis: &Diagnosis) -> Result<(), Self::Error> {
        let symptoms_json = serde_json::to_string(&diagnosis.symptoms)?;
        let unrecognized_json = serde_json::to_string(&diagnosis.unrecognized)?;
        let conn = self.lock()?;

        conn.execute(
            r"
            INSERT INTO diagnoses (
                id, symptoms_json, unrecognized_json, disease, class_index, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                diagnosis.id,
                symptoms_json,
                unrecognized_json,
                diagnosis.prediction.disease,
                diagnosis.prediction.class_index.value(),
                diagnosis.created_at.to_rfc3339(),
            ],
        )?;

        tracing::debug!("Saved diagnosis {} to storage", diagnosis.id);
        Ok(())
    }

    fn load_recent_diagnoses(&self, limit: usize) -> Result<Vec<Diagnosis>, Self::Error> {
        let limit = sql_int("limit", limit)?;
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {DIAGNOSIS_COLUMNS} FROM diagnoses ORDER BY created_at DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit], Self::read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(Self::decode_row).collect()
    }

    fn load_diagnoses_paginated(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<DiagnosisPage, Self::Error> {
        let sql_limit = sql_int("limit", limit)?;
        let sql_offset = sql_int("offset", offset)?;
        let conn = self.lock()?;

        let total_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM diagnoses", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {DIAGNOSIS_COLUMNS} FROM diagnoses ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt
            .query_map(params![sql_limit, sql_offset], Self::read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let items = rows
            .into_iter()
            .map(Self::decode_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DiagnosisPage::new(items, total_count as usize, offset, limit))
    }

    fn count_diagnoses(&self) -> Result<usize, Self::Error> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM diagnoses", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn delete_diagnosis(&self, id: &str) -> Result<(), Self::Error> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM diagnoses WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StorageError::NotFound(format!("diagnosis {id}")));
        }
        Ok(())
    }

    fn clear_history(&self) -> Result<(), Self::Error> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM diagnoses", [])?;
        tracing::warn!("Cleared diagnosis history");
        Ok(())
    }
}

impl ReferenceStore for SqliteStorage {
    type Error = StorageError;

    fn save_profile(&self, profile: &DiseaseProfile) -> Result<(), Self::Error> {
        let profile_json = serde_json::to_string(profile)?;
        let conn = self.lock()?;

        conn.execute(
            r"
            INSERT OR REPLACE INTO disease_profiles (disease, profile_json, updated_at)
            VALUES (?1, ?2, ?3)
            ",
            params![profile.disease, profile_json, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn load_profile(&self, disease: &str) -> Result<Option<DiseaseProfile>, Self::Error> {
        let conn = self.lock()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT profile_json FROM disease_profiles WHERE disease = ?1",
                params![disease],
                |row| row.get(0),
            )
            .optional()?;

        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    fn list_diseases(&self) -> Result<Vec<String>, Self::Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT disease FROM disease_profiles ORDER BY disease")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DiagnosisOutcome;

    fn diagnosis(disease: &str, code: i64) -> Diagnosis {
        let outcome = DiagnosisOutcome {
            prediction: Prediction {
                disease: disease.into(),
                class_index: ClassIndex(code),
            },
            unrecognized: vec!["unknown_thing".into()],
        };
        Diagnosis::new(vec!["itching".into(), "unknown_thing".into()], &outcome)
    }

    #[test]
    fn test_diagnosis_crud() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        assert_eq!(storage.count_diagnoses().expect("Should count"), 0);

        let d = diagnosis("Fungal infection", 15);
        let id = d.id.clone();
        storage.save_diagnosis(&d).expect("Should save");
        assert_eq!(storage.count_diagnoses().expect("Should count"), 1);

        let loaded = storage.load_recent_diagnoses(10).expect("Should load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, id);
        assert_eq!(loaded[0].prediction, d.prediction);
        assert_eq!(loaded[0].symptoms, d.symptoms);
        assert_eq!(loaded[0].unrecognized, vec!["unknown_thing"]);

        storage.delete_diagnosis(&id).expect("Should delete");
        assert_eq!(storage.count_diagnoses().expect("Should count"), 0);
        assert!(matches!(
            storage.delete_diagnosis(&id),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_pagination_and_clear() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        for code in [15, 4, 16] {
            storage
                .save_diagnosis(&diagnosis("x", code))
                .expect("Should save");
        }

        let page = storage.load_diagnoses_paginated(0, 2).expect("Should page");
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_count, 3);
        assert!(page.has_more);

        let last = storage.load_diagnoses_paginated(2, 2).expect("Should page");
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more);

        storage.clear_history().expect("Should clear");
        assert_eq!(storage.count_diagnoses().expect("Should count"), 0);
    }

    #[test]
    fn test_out_of_range_limits_rejected() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        storage
            .save_diagnosis(&diagnosis("x", 15))
            .expect("Should save");

        assert!(matches!(
            storage.load_recent_diagnoses(usize::MAX),
            Err(StorageError::InvalidQuery(_))
        ));
        assert!(matches!(
            storage.load_diagnoses_paginated(usize::MAX, 10),
            Err(StorageError::InvalidQuery(_))
        ));
        assert!(matches!(
            storage.load_diagnoses_paginated(0, usize::MAX),
            Err(StorageError::InvalidQuery(_))
        ));
        assert_eq!(
            storage
                .load_recent_diagnoses(i64::MAX as usize)
                .expect("Should load")
                .len(),
            1
        );
    }

    #[test]
    fn test_profiles_roundtrip() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        assert!(storage.load_profile("Malaria").expect("Should load").is_none());

        let mut profile = DiseaseProfile::new("Malaria");
        profile.medications = vec!["Antimalarial drugs".into()];
        storage.save_profile(&profile).expect("Should save");

        profile.diets = vec!["Light meals".into()];
        storage.save_profile(&profile).expect("Should replace");

        let loaded = storage
            .load_profile("Malaria")
            .expect("Should load")
            .expect("Should exist");
        assert_eq!(loaded, profile);
        assert_eq!(storage.list_diseases().expect("Should list"), vec!["Malaria"]);
        assert!(storage.load_profile("malaria").expect("Should load").is_none());
    }
}
