//! Key-value persistence for the mod registry.
//!
//! The store is atomic per call and has no multi-key transactions, which is
//! why the registry always writes itself as one value under one key.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::types::ModError;

/// Maximum store file size accepted on load (16 MB).
const MAX_STORE_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Key-value store backing the registry.
pub trait KeyValueStore: Send + Sync {
    /// Returns the values present for the given keys.
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>, ModError>;

    /// Writes all entries in one atomic call.
    fn set(&self, entries: HashMap<String, Value>) -> Result<(), ModError>;

    /// Removes a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), ModError>;
}

/// Store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-filled with entries.
    #[must_use]
    pub fn with_entries(entries: HashMap<String, Value>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>, ModError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(*k).map(|v| ((*k).to_string(), v.clone())))
            .collect())
    }

    fn set(&self, new_entries: HashMap<String, Value>) -> Result<(), ModError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.extend(new_entries);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ModError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

/// Store persisted as a single JSON object on disk.
///
/// Every write replaces the file through a sibling temp file and a rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Creates a store at the given path. The file is created on first write.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, ModError> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(ModError::Store(e.to_string())),
        };

        if metadata.len() > MAX_STORE_FILE_SIZE {
            return Err(ModError::Store(format!(
                "{} exceeds {} bytes",
                self.path.display(),
                MAX_STORE_FILE_SIZE
            )));
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| ModError::Store(e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(ModError::Store(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }

    fn write_all(&self, map: &Map<String, Value>) -> Result<(), ModError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ModError::Store(e.to_string()))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(map)?;
        fs::write(&tmp, content).map_err(|e| ModError::Store(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            warn!("[STORE] Failed to replace {}: {}", self.path.display(), e);
            let _ = fs::remove_file(&tmp);
            ModError::Store(e.to_string())
        })?;

        debug!("[STORE] Wrote {} keys to {}", map.len(), self.path.display());
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>, ModError> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut map = self.read_all()?;
        Ok(keys
            .iter()
            .filter_map(|k| map.remove(*k).map(|v| ((*k).to_string(), v)))
            .collect())
    }

    fn set(&self, entries: HashMap<String, Value>) -> Result<(), ModError> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut map = self.read_all()?;
        map.extend(entries);
        self.write_all(&map)
    }

    fn remove(&self, key: &str) -> Result<(), ModError> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut map = self.read_all()?;
        if map.remove(key).is_some() {
            self.write_all(&map)?;
        }
        Ok(())
    }
}

fn poisoned() -> ModError {
    ModError::Store("store lock poisoned".to_string())
}
