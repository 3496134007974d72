//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use codystools::mods::{
    HttpResponse, HttpTransport, KeyValueStore, MODS_KEY, MemoryStore, Mod, ModError, ModScope,
    ModService, ScriptInjector, ServiceOptions, TabId,
};
use serde_json::Value;

/// Raw-file URL of a repository file.
pub fn raw_url(owner: &str, repo: &str, file: &str) -> String {
    format!(
        "https://raw.githubusercontent.com/{}/{}/main/{}",
        owner, repo, file
    )
}

/// A minimal valid manifest.
pub fn manifest(name: &str, version: &str) -> String {
    serde_json::json!({
        "name": name,
        "version": version,
        "description": format!("{} description", name),
        "matches": ["*"],
        "js": format!("console.log('{}')", name),
    })
    .to_string()
}

/// Transport answering from a table of canned responses; unknown URLs 404.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, HttpResponse>>,
    requests: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    timeouts: Mutex<HashSet<String>>,
    panic_next: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: &str) {
        self.serve_status(url, 200, body);
    }

    pub fn serve_status(&self, url: &str, status: u16, body: &str) {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            HttpResponse {
                status,
                body: body.to_string(),
            },
        );
    }

    /// Serves `mod.json` for `owner/repo` on the main branch.
    pub fn serve_manifest(&self, owner: &str, repo: &str, body: &str) {
        self.serve(&raw_url(owner, repo, "mod.json"), body);
    }

    /// Answers `url` with a `Timeout` error.
    pub fn serve_timeout(&self, url: &str) {
        self.timeouts.lock().unwrap().insert(url.to_string());
    }

    /// Makes the next request panic.
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| *u == url)
            .count()
    }
}

impl HttpTransport for FakeTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, ModError> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.timeouts.lock().unwrap().contains(url) {
            return Err(ModError::Timeout(url.to_string()));
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("transport blew up on {}", url);
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(HttpResponse {
                status: 404,
                body: String::new(),
            }))
    }
}

/// In-memory store that counts registry writes and can be made to fail.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    registry_writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn registry_writes(&self) -> usize {
        self.registry_writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The registry as persisted.
    pub fn stored_mods(&self) -> Vec<Mod> {
        let mut values = self.inner.get(&[MODS_KEY]).unwrap();
        values
            .remove(MODS_KEY)
            .map(|v| serde_json::from_value(v).unwrap())
            .unwrap_or_default()
    }
}

impl KeyValueStore for CountingStore {
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>, ModError> {
        self.inner.get(keys)
    }

    fn set(&self, entries: HashMap<String, Value>) -> Result<(), ModError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ModError::Store("disk full".to_string()));
        }
        if entries.contains_key(MODS_KEY) {
            self.registry_writes.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.set(entries)
    }

    fn remove(&self, key: &str) -> Result<(), ModError> {
        self.inner.remove(key)
    }
}

/// Service over the given fakes with no built-in defaults.
pub fn service(transport: &Arc<FakeTransport>, store: &Arc<CountingStore>) -> ModService {
    service_with_defaults(transport, store, Vec::new())
}

pub fn service_with_defaults(
    transport: &Arc<FakeTransport>,
    store: &Arc<CountingStore>,
    defaults: Vec<Mod>,
) -> ModService {
    service_with_options(
        transport,
        store,
        ServiceOptions {
            defaults,
            ..ServiceOptions::default()
        },
    )
}

pub fn service_with_options(
    transport: &Arc<FakeTransport>,
    store: &Arc<CountingStore>,
    options: ServiceOptions,
) -> ModService {
    ModService::new(store.clone(), transport.clone(), options).unwrap()
}

/// Contents-API URL of a repository file on the main branch.
pub fn contents_url(owner: &str, repo: &str, file: &str) -> String {
    format!(
        "https://api.github.com/repos/{}/{}/contents/{}?ref=main",
        owner, repo, file
    )
}

/// Wraps file text in a contents-API envelope.
pub fn envelope(text: &str) -> String {
    use base64::Engine;
    serde_json::json!({
        "name": "file",
        "encoding": "base64",
        "content": base64::engine::general_purpose::STANDARD.encode(text),
    })
    .to_string()
}

/// Injector recording every call as `tab:kind:detail`.
#[derive(Default)]
pub struct RecordingInjector {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingInjector {
    pub fn scripts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.contains(":js:"))
            .cloned()
            .collect()
    }
}

impl ScriptInjector for RecordingInjector {
    fn insert_css(&self, tab_id: TabId, css: &str) -> Result<(), ModError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:css:{}", tab_id, css));
        Ok(())
    }

    fn execute_script(&self, tab_id: TabId, scope: &ModScope) -> Result<(), ModError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:js:{}", tab_id, scope.mod_id));
        Ok(())
    }
}
