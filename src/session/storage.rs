//! Persisted client-side values.
//!
//! Selected local indexes survive restarts. Values are stored as text
//! keyed by variable name, with a long expiry, and read back at startup.
//!
//! | Store | Backing | Use |
//! |-------|---------|-----|
//! | [`MemoryStore`] | `FxHashMap` | Tests, kiosks without storage |
//! | [`FileStore`] | JSON file | Default for desktop clients |

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Lifetime of a persisted value, about a century.
pub const MAX_AGE: Duration = Duration::from_secs(3_153_600_000);

// ============================================================================
// PersistentStore
// ============================================================================

/// Durable key/value storage for local variables.
pub trait PersistentStore: Send {
    /// Loads every unexpired value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn load(&self) -> Result<FxHashMap<String, String>>;

    /// Stores one value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn store(&mut self, name: &str, value: &str) -> Result<()>;
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Store living only as long as the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: FxHashMap<String, String>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store prefilled with values.
    #[must_use]
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Returns a stored value.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self) -> Result<FxHashMap<String, String>> {
        Ok(self.values.clone())
    }

    fn store(&mut self, name: &str, value: &str) -> Result<()> {
        self.values.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// FileStore
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    name: String,
    value: String,
    /// Unix seconds.
    expires_at: u64,
}

/// Store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store at `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }

    fn read_entries(&self) -> Result<Vec<StoredValue>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let now = Self::now_secs();
        let entries: Vec<StoredValue> = serde_json::from_str(&text)?;
        Ok(entries.into_iter().filter(|e| e.expires_at > now).collect())
    }
}

impl PersistentStore for FileStore {
    fn load(&self) -> Result<FxHashMap<String, String>> {
        let values: FxHashMap<_, _> = self
            .read_entries()?
            .into_iter()
            .map(|e| (e.name, e.value))
            .collect();
        debug!(path = %self.path.display(), count = values.len(), "Persisted values loaded");
        Ok(values)
    }

    fn store(&mut self, name: &str, value: &str) -> Result<()> {
        let mut entries = self.read_entries()?;
        let expires_at = Self::now_secs().saturating_add(MAX_AGE.as_secs());

        match entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.value = value.to_string();
                entry.expires_at = expires_at;
            }
            None => entries.push(StoredValue {
                name: name.to_string(),
                value: value.to_string(),
                expires_at,
            }),
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&entries)?)?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::with_values([("lang", "1")]);
        store.store("unit", "bar").expect("store");

        let values = store.load().expect("load");
        assert_eq!(values.get("lang").map(String::as_str), Some("1"));
        assert_eq!(store.get("unit"), Some("bar"));
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::new(dir.path().join("absent.json"));
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("hmi.json");

        let mut store = FileStore::new(&path);
        store.store("lang", "0").expect("store");
        store.store("lang", "2").expect("store");
        store.store("unit", "metric").expect("store");

        let reopened = FileStore::new(&path);
        let values = reopened.load().expect("load");
        assert_eq!(values.len(), 2);
        assert_eq!(values.get("lang").map(String::as_str), Some("2"));
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn test_file_store_drops_expired() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("hmi.json");
        let stale = vec![
            StoredValue {
                name: "old".into(),
                value: "x".into(),
                expires_at: 1,
            },
            StoredValue {
                name: "fresh".into(),
                value: "y".into(),
                expires_at: u64::MAX,
            },
        ];
        fs::write(&path, serde_json::to_vec(&stale).expect("json")).expect("write");

        let values = FileStore::new(&path).load().expect("load");
        assert!(!values.contains_key("old"));
        assert!(values.contains_key("fresh"));
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("hmi.json");
        fs::write(&path, "not json").expect("write");
        assert!(FileStore::new(&path).load().is_err());
    }
}
