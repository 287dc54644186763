//! Durable local storage for the anonymous session.
//!
//! A key/value store of JSON strings. `FileStorage` keeps one file per key
//! and replaces it atomically (write temp file, then rename) so a crash
//! mid-write leaves the previous record intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::AppError;

pub trait LocalStorage: Send + Sync {
    /// Read the record under `key`. `Ok(None)` if nothing was stored yet.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the record exists but cannot be read.
    fn load(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Replace the record under `key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the write fails.
    fn save(&self, key: &str, value: &str) -> Result<(), AppError>;
}

// =============================================================================
// FILE STORAGE
// =============================================================================

pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Store records as `<dir>/<key>.json`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl LocalStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, AppError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), AppError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

// =============================================================================
// MEMORY STORAGE
// =============================================================================

/// In-process storage. Clones share the same map, which lets tests reopen a
/// store against the "same disk".
#[derive(Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail, to exercise storage error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        *self
            .fail_writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = fail;
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl LocalStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.raw(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), AppError> {
        if *self
            .fail_writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
        {
            return Err(AppError::Storage("quota exceeded".into()));
        }
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
