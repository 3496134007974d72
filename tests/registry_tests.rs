//! Integration tests for the mod registry and the default merge.
//!
//! These tests drive the registry through its public API:
//! - Protected deletes and settings purge
//! - Default merge policy and idempotence
//! - Persistence through the JSON file store
//! - Serialized concurrent writers

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

use std::sync::Arc;
use std::thread;

use codystools::mods::{
    JsonFileStore, MODS_KEY, Mod, ModError, ModRegistry, ModSource, builtin_defaults,
};
use helpers::CountingStore;

fn registry(store: &Arc<CountingStore>) -> ModRegistry {
    ModRegistry::load(store.clone()).unwrap()
}

// ============================================================================
// Delete Tests
// ============================================================================

mod delete_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_delete_fails_exactly_for_default_mods() {
        let store = CountingStore::new();
        let reg = registry(&store);
        let mods = vec![
            Mod::new("user-a", "A", "1"),
            Mod::new("default-b", "B", "1").as_default(),
            Mod::new("user-c", "C", "1"),
            Mod::new("default-d", "D", "1").as_default(),
        ];
        for m in &mods {
            reg.upsert(m.clone()).unwrap();
        }

        for m in &mods {
            let result = reg.delete(&m.id);
            if m.is_default {
                assert_eq!(result.unwrap_err(), ModError::ProtectedMod(m.id.clone()));
            } else {
                assert_eq!(result.unwrap().id, m.id);
            }
        }

        let left: Vec<String> = reg.list().into_iter().map(|m| m.id).collect();
        assert_eq!(left, vec!["default-b", "default-d"]);
    }

    #[test]
    fn test_failed_delete_writes_nothing() {
        let store = CountingStore::new();
        let reg = registry(&store);
        reg.upsert(Mod::new("d", "D", "1").as_default()).unwrap();
        let writes = store.registry_writes();

        assert!(reg.delete("d").is_err());
        assert!(reg.delete("ghost").is_err());
        assert_eq!(store.registry_writes(), writes);
    }

    #[test]
    fn test_failed_persist_keeps_previous_state() {
        let store = CountingStore::new();
        let reg = registry(&store);
        reg.upsert(Mod::new("a", "A", "1")).unwrap();

        store.fail_writes(true);
        assert!(matches!(reg.set_enabled("a", true), Err(ModError::Store(_))));
        assert!(reg.delete("a").is_err());
        store.fail_writes(false);

        let a = reg.get("a").unwrap();
        assert!(!a.enabled);
        assert_eq!(store.stored_mods(), vec![a]);
    }
}

// ============================================================================
// Default Merge Tests
// ============================================================================

mod merge_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_refresh_keeps_enabled() {
        let store = CountingStore::new();
        let reg = registry(&store);
        let mut d1 = Mod::new("d1", "Default One", "1.0.0").as_default();
        d1.enabled = true;
        reg.upsert(d1).unwrap();

        let updated = Mod::new("d1", "Default One", "1.1.0")
            .with_description("now better")
            .as_default();
        let report = reg.merge_defaults(&[updated]).unwrap();

        assert_eq!(report.refreshed, vec!["d1"]);
        let d1 = reg.get("d1").unwrap();
        assert_eq!(d1.version, "1.1.0");
        assert_eq!(d1.description, "now better");
        assert!(d1.enabled);
    }

    #[test]
    fn test_merge_twice_equals_merge_once() {
        let store = CountingStore::new();
        let reg = registry(&store);
        let mut user = Mod::new("user", "User", "2.0.0");
        user.enabled = true;
        reg.upsert(user).unwrap();

        let defaults = builtin_defaults();
        reg.merge_defaults(&defaults).unwrap();
        let once = reg.list();
        let writes = store.registry_writes();

        let report = reg.merge_defaults(&defaults).unwrap();
        assert!(!report.changed());
        assert_eq!(reg.list(), once);
        assert_eq!(store.registry_writes(), writes);
        assert!(reg.get("user").unwrap().enabled);
    }

    #[test]
    fn test_merge_never_touches_user_mod_with_default_id() {
        let store = CountingStore::new();
        let reg = registry(&store);
        let source = ModSource::new("someone", "dark", "main").unwrap();
        let mine = Mod::new("dark-mode", "My Dark Mode", "9.0.0").with_source(source);
        reg.upsert(mine.clone()).unwrap();

        let report = reg.merge_defaults(&builtin_defaults()).unwrap();
        assert_eq!(report.collisions, vec!["dark-mode"]);
        assert_eq!(reg.get("dark-mode").unwrap(), mine);
        assert!(reg.contains("ad-blocker"));
    }
}

// ============================================================================
// Persistence Tests
// ============================================================================

mod persistence_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_registry_survives_reload_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mods.json");

        {
            let reg = ModRegistry::load(Arc::new(JsonFileStore::new(path.clone()))).unwrap();
            reg.upsert(Mod::new("b", "B", "1")).unwrap();
            reg.upsert(Mod::new("a", "A", "1")).unwrap();
            reg.set_enabled("a", true).unwrap();
        }

        let reg = ModRegistry::load(Arc::new(JsonFileStore::new(path.clone()))).unwrap();
        let ids: Vec<String> = reg.list().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(reg.get("a").unwrap().enabled);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw[MODS_KEY].is_array());
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        let store = CountingStore::new();
        let reg = Arc::new(registry(&store));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    for j in 0..5 {
                        reg.upsert(Mod::new(&format!("m{}-{}", i, j), "M", "1"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(reg.len(), 40);
        assert_eq!(store.stored_mods().len(), 40);
    }
}
