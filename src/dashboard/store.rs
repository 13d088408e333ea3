//! File-backed shared state with advisory locks.
//!
//! Readers take a shared lock and writers an exclusive one, so nobody sees
//! a half-written document. Mutators are plain read-modify-write cycles
//! with no compare-and-swap: two processes updating different fields at the
//! same time can lose one of the updates.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use fs2::FileExt;

use crate::dashboard::model::{
    ExternalFactor, OrdinalScore, PatientInfo, RiskAlert, SharedState, Symptom,
};
use crate::error::StoreError;

pub struct SharedStateStore {
    path: PathBuf,
}

impl SharedStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn lock_err(&self, kind: &'static str, source: std::io::Error) -> StoreError {
        StoreError::Lock {
            kind,
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Create the document with the default shape if it does not exist.
    pub fn init(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }
        self.write(SharedState::default())
    }

    /// Read the full document. `Ok(None)` when the file does not exist or
    /// is empty (created by a writer that has not yet taken its lock).
    pub fn try_read(&self) -> Result<Option<SharedState>, StoreError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        FileExt::lock_shared(&file).map_err(|e| self.lock_err("shared", e))?;
        let mut contents = String::new();
        let read = file.read_to_string(&mut contents);
        // Unlock before surfacing any read error.
        let _ = FileExt::unlock(&file);
        read.map_err(|e| self.io_err(e))?;

        if contents.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Read the document, treating any failure as "no active session".
    pub fn read(&self) -> Option<SharedState> {
        match self.try_read() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read shared state");
                None
            }
        }
    }

    /// Replace the whole document, stamping `last_updated`.
    pub fn write(&self, mut state: SharedState) -> Result<(), StoreError> {
        state.last_updated = Utc::now();
        let body = serde_json::to_vec_pretty(&state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        // No truncate on open: the length is reset only once the lock is held.
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        file.lock_exclusive()
            .map_err(|e| self.lock_err("exclusive", e))?;

        let result = file
            .set_len(0)
            .and_then(|_| file.write_all(&body))
            .and_then(|_| file.flush());
        let _ = FileExt::unlock(&file);
        result.map_err(|e| self.io_err(e))
    }

    /// Delete the document. Missing is fine.
    pub fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Read-modify-write. Starts from the default document when absent.
    /// Not atomic across processes.
    pub fn modify<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut SharedState),
    {
        let mut state = self.try_read()?.unwrap_or_default();
        f(&mut state);
        self.write(state)
    }

    pub fn update_patient(&self, patient: PatientInfo) -> Result<(), StoreError> {
        self.modify(|s| s.patient = Some(patient))
    }

    pub fn update_symptom(&self, symptom: Symptom, score: OrdinalScore) -> Result<(), StoreError> {
        self.modify(|s| {
            s.symptoms.insert(symptom, score);
        })
    }

    pub fn update_external_factors(
        &self,
        factors: &[(ExternalFactor, OrdinalScore)],
    ) -> Result<(), StoreError> {
        self.modify(|s| s.external_factors.extend(factors.iter().copied()))
    }

    /// Count one more occurrence of `label` and one more analysed message.
    pub fn update_emotion(&self, label: &str) -> Result<(), StoreError> {
        self.modify(|s| {
            *s.top_emotions.entry(label.to_string()).or_insert(0) += 1;
            s.message_count += 1;
        })
    }

    /// Record the latest risk level and optionally log an alert.
    pub fn update_suicide_risk(
        &self,
        label: &str,
        score: u8,
        alert: Option<RiskAlert>,
    ) -> Result<(), StoreError> {
        self.modify(|s| {
            s.suicide_risk.label = label.to_string();
            s.suicide_risk.score = score;
            if let Some(alert) = alert {
                s.suicide_risk.alerts.push(alert);
            }
        })
    }

    /// Run a store operation on the blocking thread pool.
    pub async fn blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&SharedStateStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}
