//! The mod registry.
//!
//! Owns the ordered mapping from mod id to mod record and its round-trips
//! through the key-value store. The whole registry is written as one value
//! under [`MODS_KEY`]; it is never persisted partially.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::store::KeyValueStore;
use super::types::{Mod, ModError};

/// Store key holding the registry snapshot.
pub const MODS_KEY: &str = "mods";

/// Ordered, id-unique collection of mods backed by a key-value store.
pub struct ModRegistry {
    /// Persistence backend.
    store: Arc<dyn KeyValueStore>,
    /// Last persisted snapshot, in insertion order.
    mods: RwLock<Vec<Mod>>,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl ModRegistry {
    /// Loads the registry from the store.
    ///
    /// Accepts either an array of mods or an object keyed by id. Entries that
    /// fail to decode and duplicate ids are dropped with a warning.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, ModError> {
        let mut values = store.get(&[MODS_KEY])?;
        let mods = match values.remove(MODS_KEY) {
            Some(value) => decode_snapshot(value),
            None => Vec::new(),
        };

        info!("[REGISTRY] Loaded {} mods", mods.len());

        Ok(Self {
            store,
            mods: RwLock::new(mods),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns a mod by id.
    pub fn get(&self, id: &str) -> Result<Mod, ModError> {
        self.read(|mods| mods.iter().find(|m| m.id == id).cloned())?
            .ok_or_else(|| ModError::NotFound(id.to_string()))
    }

    /// Returns true if a mod with this id exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.read(|mods| mods.iter().any(|m| m.id == id))
            .unwrap_or(false)
    }

    /// Returns every mod in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<Mod> {
        self.read(|mods| mods.clone()).unwrap_or_default()
    }

    /// Returns the enabled mods in insertion order.
    #[must_use]
    pub fn enabled(&self) -> Vec<Mod> {
        self.read(|mods| mods.iter().filter(|m| m.enabled).cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of mods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read(|mods| mods.len()).unwrap_or(0)
    }

    /// Returns true if the registry holds no mods.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a mod, or replaces the record with the same id in place.
    pub fn upsert(&self, record: Mod) -> Result<(), ModError> {
        self.mutate(|mods| {
            upsert_in(mods, record);
            Ok(((), true))
        })
    }

    /// Deletes a non-default mod and purges its settings key.
    pub fn delete(&self, id: &str) -> Result<Mod, ModError> {
        let removed = self.mutate(|mods| {
            let index = mods
                .iter()
                .position(|m| m.id == id)
                .ok_or_else(|| ModError::NotFound(id.to_string()))?;

            if mods[index].is_default {
                return Err(ModError::ProtectedMod(id.to_string()));
            }

            Ok((mods.remove(index), true))
        })?;

        if let Err(e) = self.store.remove(&Mod::settings_key(id)) {
            warn!("[REGISTRY] Failed to purge settings for '{}': {}", id, e);
        }

        info!("[REGISTRY] Deleted mod '{}'", id);
        Ok(removed)
    }

    /// Enables or disables a mod.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Mod, ModError> {
        self.mutate(|mods| {
            let record = mods
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| ModError::NotFound(id.to_string()))?;

            let changed = record.enabled != enabled;
            record.enabled = enabled;
            Ok((record.clone(), changed))
        })
    }

    /// Replaces the whole registry.
    pub fn replace_all(&self, records: Vec<Mod>) -> Result<(), ModError> {
        let mut seen = HashSet::new();
        if let Some(dup) = records.iter().find(|m| !seen.insert(m.id.as_str())) {
            return Err(ModError::Store(format!("duplicate mod id '{}'", dup.id)));
        }

        self.mutate(move |mods| {
            *mods = records;
            Ok(((), true))
        })
    }

    /// Runs a read-modify-write cycle as one critical section.
    ///
    /// `f` receives a copy of the current snapshot and returns a value plus
    /// whether it changed anything. A changed snapshot is persisted before it
    /// becomes visible; if `f` or the persist fails nothing is published.
    pub fn mutate<F, R>(&self, f: F) -> Result<R, ModError>
    where
        F: FnOnce(&mut Vec<Mod>) -> Result<(R, bool), ModError>,
    {
        let _writer = self.lock_writer()?;

        let mut working = self.read(|mods| mods.clone())?;
        let (result, changed) = f(&mut working)?;

        if changed {
            self.persist(&working)?;
            let mut mods = self
                .mods
                .write()
                .map_err(|_| ModError::Store("registry lock poisoned".to_string()))?;
            *mods = working;
        }

        Ok(result)
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    fn persist(&self, mods: &[Mod]) -> Result<(), ModError> {
        let value = serde_json::to_value(mods)?;
        self.store
            .set(HashMap::from([(MODS_KEY.to_string(), value)]))?;
        debug!("[REGISTRY] Persisted {} mods", mods.len());
        Ok(())
    }

    fn read<F, R>(&self, f: F) -> Result<R, ModError>
    where
        F: FnOnce(&Vec<Mod>) -> R,
    {
        let mods = self
            .mods
            .read()
            .map_err(|_| ModError::Store("registry lock poisoned".to_string()))?;
        Ok(f(&mods))
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, ()>, ModError> {
        self.write_lock
            .lock()
            .map_err(|_| ModError::Store("registry writer lock poisoned".to_string()))
    }
}

/// Inserts or replaces in place, keeping insertion order.
pub(crate) fn upsert_in(mods: &mut Vec<Mod>, record: Mod) {
    match mods.iter_mut().find(|m| m.id == record.id) {
        Some(existing) => *existing = record,
        None => mods.push(record),
    }
}

/// Decodes a stored snapshot in either historical layout.
fn decode_snapshot(value: Value) -> Vec<Mod> {
    let entries: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        Value::Null => Vec::new(),
        other => {
            warn!("[REGISTRY] Ignoring stored registry of unexpected shape: {}", other);
            Vec::new()
        }
    };

    let mut seen = HashSet::new();
    let mut mods = Vec::with_capacity(entries.len());

    for entry in entries {
        match serde_json::from_value::<Mod>(entry) {
            Ok(m) if m.id.is_empty() => warn!("[REGISTRY] Dropping stored mod without id"),
            Ok(m) => {
                if seen.insert(m.id.clone()) {
                    mods.push(m);
                } else {
                    warn!("[REGISTRY] Dropping duplicate stored mod '{}'", m.id);
                }
            }
            Err(e) => warn!("[REGISTRY] Dropping undecodable stored mod: {}", e),
        }
    }

    mods
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::store::MemoryStore;
    use serde_json::json;

    fn empty_registry() -> ModRegistry {
        ModRegistry::load(Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn test_upsert_keeps_insertion_order() {
        let registry = empty_registry();
        registry.upsert(Mod::new("b", "B", "1")).unwrap();
        registry.upsert(Mod::new("a", "A", "1")).unwrap();
        registry.upsert(Mod::new("b", "B2", "2")).unwrap();

        let ids: Vec<String> = registry.list().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(registry.get("b").unwrap().name, "B2");
    }

    #[test]
    fn test_delete_protected_and_missing() {
        let registry = empty_registry();
        registry.upsert(Mod::new("d", "D", "1").as_default()).unwrap();

        assert_eq!(
            registry.delete("d").unwrap_err(),
            ModError::ProtectedMod("d".to_string())
        );
        assert_eq!(
            registry.delete("nope").unwrap_err(),
            ModError::NotFound("nope".to_string())
        );
        assert!(registry.contains("d"));
    }

    #[test]
    fn test_delete_purges_settings() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(HashMap::from([(Mod::settings_key("u"), json!({"x": 1}))]))
            .unwrap();
        let registry = ModRegistry::load(store.clone()).unwrap();
        registry.upsert(Mod::new("u", "U", "1")).unwrap();

        registry.delete("u").unwrap();
        assert!(!registry.contains("u"));
        assert!(store.get(&["mod_u_settings"]).unwrap().is_empty());
    }

    #[test]
    fn test_set_enabled() {
        let registry = empty_registry();
        registry.upsert(Mod::new("a", "A", "1")).unwrap();

        assert!(registry.set_enabled("a", true).unwrap().enabled);
        assert_eq!(registry.enabled().len(), 1);
        assert!(matches!(
            registry.set_enabled("zz", true),
            Err(ModError::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_mutation_publishes_nothing() {
        let registry = empty_registry();
        registry.upsert(Mod::new("a", "A", "1")).unwrap();

        let result: Result<(), ModError> = registry.mutate(|mods| {
            mods.clear();
            Err(ModError::Store("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_load_object_layout_and_duplicates() {
        let store = MemoryStore::with_entries(HashMap::from([(
            MODS_KEY.to_string(),
            json!({
                "one": {"id": "one", "name": "One", "version": "1"},
                "two": {"id": "two", "name": "Two", "version": "1"},
            }),
        )]));
        let registry = ModRegistry::load(Arc::new(store)).unwrap();
        assert_eq!(registry.len(), 2);

        let store = MemoryStore::with_entries(HashMap::from([(
            MODS_KEY.to_string(),
            json!([
                {"id": "x", "name": "X", "version": "1"},
                {"id": "x", "name": "X again", "version": "2"},
                {"name": "broken"},
            ]),
        )]));
        let registry = ModRegistry::load(Arc::new(store)).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("x").unwrap().name, "X");
    }

    #[test]
    fn test_replace_all_rejects_duplicates() {
        let registry = empty_registry();
        let result = registry.replace_all(vec![Mod::new("a", "A", "1"), Mod::new("a", "A", "1")]);
        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
