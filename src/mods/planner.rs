//! Injection planning for page navigations.
//!
//! [`InjectionPlanner`] decides which mods belong on a page. The
//! [`InjectionTracker`] remembers what has already been applied to each
//! page load so repeated lifecycle events never inject a mod twice, and
//! [`apply_plan`] hands the planned content to a [`ScriptInjector`].
//!
//! Mod scripts run behind a [`ModScope`]: the injector receives the script
//! text plus a fixed list of host capabilities and nothing else from the
//! engine. This is an interface boundary, not a security sandbox; a mod
//! script runs with whatever authority the page context gives it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::pattern::matches_url;
use super::registry::ModRegistry;
use super::types::{Mod, ModError};

/// Schemes never injected into by default.
pub const DEFAULT_PRIVILEGED_SCHEMES: &[&str] = &["chrome://", "chrome-extension://"];

/// Browser tab identifier.
pub type TabId = u64;

/// Selects the mods to inject into a page.
#[derive(Debug, Clone)]
pub struct InjectionPlanner {
    /// URL prefixes that are never injected into.
    privileged_schemes: Vec<String>,
}

impl Default for InjectionPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_PRIVILEGED_SCHEMES.iter().map(|s| (*s).to_string()).collect())
    }
}

impl InjectionPlanner {
    /// Creates a planner with the given privileged URL prefixes.
    #[must_use]
    pub fn new(privileged_schemes: Vec<String>) -> Self {
        let privileged_schemes = privileged_schemes
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { privileged_schemes }
    }

    /// Returns the privileged URL prefixes.
    #[must_use]
    pub fn privileged_schemes(&self) -> &[String] {
        &self.privileged_schemes
    }

    /// Returns true if the URL belongs to a privileged scheme.
    #[must_use]
    pub fn is_privileged(&self, url: &str) -> bool {
        let url = url.trim_start().to_lowercase();
        self.privileged_schemes
            .iter()
            .any(|scheme| url.starts_with(scheme.as_str()))
    }

    /// Plans a navigation against the registry's current snapshot.
    #[must_use]
    pub fn plan(&self, url: &str, registry: &ModRegistry) -> Vec<Mod> {
        if self.is_privileged(url) {
            debug!("[PLAN] Skipping privileged URL {}", url);
            return Vec::new();
        }
        self.plan_mods(url, &registry.enabled())
    }

    /// Plans a navigation against an explicit list, keeping its order.
    #[must_use]
    pub fn plan_mods(&self, url: &str, mods: &[Mod]) -> Vec<Mod> {
        if self.is_privileged(url) {
            return Vec::new();
        }

        let plan: Vec<Mod> = mods
            .iter()
            .filter(|m| m.enabled && matches_url(&m.target_sites, url))
            .cloned()
            .collect();

        debug!("[PLAN] {} mods planned for {}", plan.len(), url);
        plan
    }
}

/// One load of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLoad {
    /// Tab the page lives in.
    pub tab_id: TabId,
    /// Unique id of this load.
    pub load_id: Uuid,
    /// Page URL.
    pub url: String,
}

#[derive(Debug)]
struct TabState {
    load_id: Uuid,
    url: String,
    applied: HashSet<String>,
}

/// Tracks which mods were applied to each open page load.
#[derive(Debug, Default)]
pub struct InjectionTracker {
    tabs: Mutex<HashMap<TabId, TabState>>,
}

impl InjectionTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new page load in a tab, forgetting the previous one.
    pub fn begin_navigation(&self, tab_id: TabId, url: &str) -> Result<PageLoad, ModError> {
        let load = PageLoad {
            tab_id,
            load_id: Uuid::new_v4(),
            url: url.to_string(),
        };

        self.lock()?.insert(
            tab_id,
            TabState {
                load_id: load.load_id,
                url: load.url.clone(),
                applied: HashSet::new(),
            },
        );
        debug!("[PLAN] Tab {} navigated to {} ({})", tab_id, url, load.load_id);
        Ok(load)
    }

    /// Returns the current load of a tab.
    pub fn current(&self, tab_id: TabId) -> Result<Option<PageLoad>, ModError> {
        Ok(self.lock()?.get(&tab_id).map(|state| PageLoad {
            tab_id,
            load_id: state.load_id,
            url: state.url.clone(),
        }))
    }

    /// Keeps the mods not yet applied to this load and marks them applied.
    ///
    /// A load that is no longer current for its tab claims nothing.
    pub fn claim(&self, load: &PageLoad, plan: Vec<Mod>) -> Result<Vec<Mod>, ModError> {
        let mut tabs = self.lock()?;
        let Some(state) = tabs.get_mut(&load.tab_id) else {
            return Ok(Vec::new());
        };
        if state.load_id != load.load_id {
            debug!("[PLAN] Ignoring stale load {} for tab {}", load.load_id, load.tab_id);
            return Ok(Vec::new());
        }

        Ok(plan
            .into_iter()
            .filter(|m| state.applied.insert(m.id.clone()))
            .collect())
    }

    /// Forgets that a mod was applied anywhere, so it is injected again on
    /// the next event for each page.
    pub fn invalidate(&self, mod_id: &str) -> Result<usize, ModError> {
        let mut tabs = self.lock()?;
        let count = tabs
            .values_mut()
            .map(|state| state.applied.remove(mod_id))
            .filter(|removed| *removed)
            .count();
        if count > 0 {
            debug!("[PLAN] Invalidated '{}' on {} pages", mod_id, count);
        }
        Ok(count)
    }

    /// Returns the mod ids applied to a tab's current load.
    pub fn applied(&self, tab_id: TabId) -> Result<Vec<String>, ModError> {
        let tabs = self.lock()?;
        let mut ids: Vec<String> = tabs
            .get(&tab_id)
            .map(|state| state.applied.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    /// Drops all state for a closed tab.
    pub fn close_tab(&self, tab_id: TabId) -> Result<(), ModError> {
        self.lock()?.remove(&tab_id);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<TabId, TabState>>, ModError> {
        self.tabs
            .lock()
            .map_err(|_| ModError::Store("injection tracker lock poisoned".to_string()))
    }
}

/// Host functions a mod script may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HostCapability {
    /// Read keys from the extension store.
    StorageGet,
    /// Write keys to the extension store.
    StorageSet,
    /// Wait for a selector to appear in the page.
    WaitForElement,
    /// Append a global `<style>` element.
    AddGlobalStyle,
}

impl HostCapability {
    /// Every capability granted to mod scripts.
    pub const ALL: [HostCapability; 4] = [
        HostCapability::StorageGet,
        HostCapability::StorageSet,
        HostCapability::WaitForElement,
        HostCapability::AddGlobalStyle,
    ];
}

/// What a script injector receives for one mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModScope {
    /// Mod id.
    pub mod_id: String,
    /// Mod display name.
    pub name: String,
    /// Store key of the mod's settings.
    pub settings_key: String,
    /// Host functions exposed to the script.
    pub capabilities: Vec<HostCapability>,
    /// Script text.
    pub script: String,
}

impl ModScope {
    /// Builds the scope for a mod's script, if it has one.
    #[must_use]
    pub fn for_mod(record: &Mod) -> Option<Self> {
        let script = record.assets.js.clone()?;
        Some(Self {
            mod_id: record.id.clone(),
            name: record.name.clone(),
            settings_key: Mod::settings_key(&record.id),
            capabilities: HostCapability::ALL.to_vec(),
            script,
        })
    }
}

/// Delivers mod content into a page.
pub trait ScriptInjector {
    /// Inserts a stylesheet.
    fn insert_css(&self, tab_id: TabId, css: &str) -> Result<(), ModError>;

    /// Executes a mod script inside its scope.
    fn execute_script(&self, tab_id: TabId, scope: &ModScope) -> Result<(), ModError>;
}

/// Result of applying a plan to one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionReport {
    /// Mods injected, in application order.
    pub applied: Vec<String>,
    /// Mods whose injection failed, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Applies claimed mods to a page in order: stylesheet first, then script.
///
/// A failing mod is reported and the rest still run.
pub fn apply_plan(load: &PageLoad, mods: &[Mod], injector: &dyn ScriptInjector) -> InjectionReport {
    let mut report = InjectionReport::default();

    for record in mods {
        let result = record
            .assets
            .css
            .as_deref()
            .map_or(Ok(()), |css| injector.insert_css(load.tab_id, css))
            .and_then(|()| {
                ModScope::for_mod(record)
                    .map_or(Ok(()), |scope| injector.execute_script(load.tab_id, &scope))
            });

        match result {
            Ok(()) => report.applied.push(record.id.clone()),
            Err(e) => {
                warn!("[PLAN] Failed to inject '{}' into tab {}: {}", record.id, load.tab_id, e);
                report.failed.push((record.id.clone(), e.to_string()));
            }
        }
    }

    if !report.applied.is_empty() {
        info!(
            "[PLAN] Injected {} mods into tab {}",
            report.applied.len(),
            load.tab_id
        );
    }
    report
}
