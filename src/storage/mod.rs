//! Persistence layer.
//!
//! Every piece of session state lives under its own key as a JSON blob in
//! a string key-value store. Writes after a ledger mutation are
//! best-effort: a failed write is logged and the in-memory state stands.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Keys for each independently persisted piece of state.
pub mod keys {
    pub const HOLDINGS: &str = "dipbuyer-assets";
    pub const HISTORY: &str = "dipbuyer-portfolio-history";
    pub const BALANCE: &str = "dipbuyer-balance";
    pub const TRANSACTIONS: &str = "dipbuyer-transactions";
    pub const SETTINGS: &str = "dipbuyer-settings";
    pub const SPEND_LOG: &str = "dipbuyer-purchases-per-period";

    pub const ALL: &[&str] = &[HOLDINGS, HISTORY, BALANCE, TRANSACTIONS, SETTINGS, SPEND_LOG];
}

/// String key-value store with get/set semantics.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Volatile store, used by tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// One file per key (`<dir>/<key>.json`).
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a state directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create state directory {}", dir.display()))?;
        info!(dir = %dir.display(), "State directory ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(contents))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        std::fs::write(&path, value)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(key, bytes = value.len(), "State written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// Serialise `value` as JSON and store it under `key`.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value).with_context(|| format!("Failed to serialise {key}"))?;
    store.set(key, &json)
}

/// Load and parse the JSON under `key`. `Ok(None)` when the key is absent.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        None => Ok(None),
        Some(raw) => {
            let value = serde_json::from_str(&raw).with_context(|| format!("Failed to parse {key}"))?;
            Ok(Some(value))
        }
    }
}

/// Load `key`, falling back to `T::default()` when it is missing or unreadable.
pub fn load_or_default<T: DeserializeOwned + Default>(store: &dyn KeyValueStore, key: &str) -> T {
    match load_json(store, key) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            warn!(key, error = %e, "Discarding unreadable state, using defaults");
            T::default()
        }
    }
}

/// Fire-and-forget write after a state change. Failures are logged only.
pub fn persist<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) {
    if let Err(e) = save_json(store, key, value) {
        warn!(key, error = %e, "Failed to persist state");
    }
}

/// Delete every session key (reset).
pub fn clear_all(store: &dyn KeyValueStore) -> Result<()> {
    for key in keys::ALL {
        store.remove(key)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpendRecord;

    fn temp_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("dipbuyer_test_state_{}", uuid::Uuid::new_v4()));
        p
    }

    #[test]
    fn test_memory_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_save_and_load_json() {
        let store = MemoryStore::new();
        let log = vec![SpendRecord {
            period_key: "2024-03-15".to_string(),
            amount: 600.0,
        }];
        save_json(&store, keys::SPEND_LOG, &log).unwrap();

        let raw = store.get(keys::SPEND_LOG).unwrap().unwrap();
        assert!(raw.contains("\"periodKey\":\"2024-03-15\""));

        let loaded: Vec<SpendRecord> = load_json(&store, keys::SPEND_LOG).unwrap().unwrap();
        assert_eq!(loaded, log);
    }

    #[test]
    fn test_load_missing_key() {
        let store = MemoryStore::new();
        let loaded: Option<Vec<SpendRecord>> = load_json(&store, keys::SPEND_LOG).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_or_default_on_corrupt_json() {
        let store = MemoryStore::new();
        store.set(keys::SPEND_LOG, "{not json").unwrap();
        assert!(load_json::<Vec<SpendRecord>>(&store, keys::SPEND_LOG).is_err());
        let loaded: Vec<SpendRecord> = load_or_default(&store, keys::SPEND_LOG);
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_persist_swallows_errors() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_set()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("disk full")));
        persist(&store, keys::BALANCE, &100.0);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = temp_dir();
        let store = FileStore::open(&dir).unwrap();
        save_json(&store, keys::BALANCE, &9600.0).unwrap();
        assert!(dir.join("dipbuyer-balance.json").exists());

        let balance: f64 = load_json(&store, keys::BALANCE).unwrap().unwrap();
        assert_eq!(balance, 9600.0);

        clear_all(&store).unwrap();
        assert!(store.get(keys::BALANCE).unwrap().is_none());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_store_missing_key() {
        let dir = temp_dir();
        let store = FileStore::open(&dir).unwrap();
        assert!(store.get(keys::HOLDINGS).unwrap().is_none());
        assert!(store.remove(keys::HOLDINGS).is_ok());
        assert_eq!(store.dir(), dir.as_path());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
