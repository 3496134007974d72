//! The mod service: the command surface used by the UI layer.
//!
//! [`ModService`] owns one registry, one fetcher, one update checker and one
//! injection tracker, and exposes the management operations. Each operation
//! returns a `Result`; [`ModService::handle`] wraps them for message-style
//! callers and turns every failure into a [`CommandResponse`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::backup::{BackupDocument, ImportReport};
use super::checker::{
    DEFAULT_CHECK_INTERVAL, UpdateChecker, UpdateNotification, UpdateScheduler,
    update_notification,
};
use super::defaults::{MergeReport, builtin_defaults};
use super::github::{HttpTransport, ManifestFetcher, ManifestLayout};
use super::planner::{
    DEFAULT_PRIVILEGED_SCHEMES, InjectionPlanner, InjectionReport, InjectionTracker, PageLoad,
    ScriptInjector, TabId, apply_plan,
};
use super::registry::{ModRegistry, upsert_in};
use super::store::KeyValueStore;
use super::types::{DEFAULT_BRANCH, Mod, ModError, ModSource, UpdateInfo};

/// Construction options for [`ModService`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Branch used when a source does not name one.
    pub default_branch: String,
    /// Repository URL layout.
    pub layout: ManifestLayout,
    /// Minimum time between scheduled update checks.
    pub check_interval: Duration,
    /// URL prefixes never injected into.
    pub privileged_schemes: Vec<String>,
    /// Default mods merged on startup.
    pub defaults: Vec<Mod>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            default_branch: DEFAULT_BRANCH.to_string(),
            layout: ManifestLayout::default(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            privileged_schemes: DEFAULT_PRIVILEGED_SCHEMES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            defaults: builtin_defaults(),
        }
    }
}

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    /// The updated record.
    #[serde(rename = "mod")]
    pub record: Mod,
    /// The mod is enabled and will be injected again on open pages.
    pub reapply: bool,
}

/// A mod that failed during a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedMod {
    /// Mod id.
    pub id: String,
    /// Error kind.
    pub kind: String,
    /// Error message.
    pub message: String,
}

/// Result of updating every mod with a pending update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdate {
    /// Mods updated successfully.
    pub updated: Vec<Mod>,
    /// Mods whose update failed.
    pub failed: Vec<FailedMod>,
}

/// Registry summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModStats {
    /// Installed mods.
    pub total: usize,
    /// Enabled mods.
    pub enabled: usize,
    /// Mods with a pending update.
    pub updates_available: usize,
    /// Last completed update check.
    pub last_update_check: Option<DateTime<Utc>>,
}

/// Owns the mod engine and exposes its operations.
pub struct ModService {
    registry: Arc<ModRegistry>,
    fetcher: Arc<ManifestFetcher>,
    checker: Arc<UpdateChecker>,
    planner: InjectionPlanner,
    tracker: InjectionTracker,
    defaults: Vec<Mod>,
    default_branch: String,
    /// Serializes settings read-modify-write cycles.
    settings_lock: Mutex<()>,
}

impl ModService {
    /// Loads the registry from `store` and wires the engine together.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn HttpTransport>,
        options: ServiceOptions,
    ) -> Result<Self, ModError> {
        let registry = Arc::new(ModRegistry::load(store)?);
        let fetcher = Arc::new(ManifestFetcher::new(transport, options.layout));
        let checker = Arc::new(UpdateChecker::new(
            Arc::clone(&registry),
            Arc::clone(&fetcher),
            options.check_interval,
        ));

        Ok(Self {
            registry,
            fetcher,
            checker,
            planner: InjectionPlanner::new(options.privileged_schemes),
            tracker: InjectionTracker::new(),
            defaults: options.defaults,
            default_branch: options.default_branch,
            settings_lock: Mutex::new(()),
        })
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModRegistry> {
        &self.registry
    }

    /// Returns the update checker.
    #[must_use]
    pub fn checker(&self) -> &Arc<UpdateChecker> {
        &self.checker
    }

    /// Returns the injection tracker.
    #[must_use]
    pub fn tracker(&self) -> &InjectionTracker {
        &self.tracker
    }

    /// Returns every mod in registry order.
    #[must_use]
    pub fn list(&self) -> Vec<Mod> {
        self.registry.list()
    }

    /// Returns one mod.
    pub fn get(&self, id: &str) -> Result<Mod, ModError> {
        self.registry.get(id)
    }

    /// Installs a mod from user input such as `owner/repo#branch`.
    pub fn install_from(&self, input: &str) -> Result<Mod, ModError> {
        let source = ModSource::parse(input, &self.default_branch)?;
        self.install(&source)
    }

    /// Installs or reinstalls a mod from its source repository.
    ///
    /// Reinstalling keeps `enabled`, `is_default` and `installed_at`. A
    /// source whose id belongs to a default mod from another repository is
    /// rejected with `ProtectedMod`.
    pub fn install(&self, source: &ModSource) -> Result<Mod, ModError> {
        info!("[SERVICE] Installing {}", source);
        let id = source.mod_id();
        if let Some(default) = self.defaults.iter().find(|d| d.id == id) {
            check_default_source(default, source)?;
        }

        let (manifest, assets) = self.fetcher.fetch_bundle(source)?;
        let now = Utc::now();

        let record = self.registry.mutate(|mods| {
            let mut record = Mod::from_manifest(source.clone(), manifest, assets, now);
            if let Some(existing) = mods.iter().find(|m| m.id == record.id) {
                if existing.is_default {
                    check_default_source(existing, source)?;
                }
                record.enabled = existing.enabled;
                record.is_default = existing.is_default;
                record.installed_at = existing.installed_at.or(record.installed_at);
            }
            upsert_in(mods, record.clone());
            Ok((record, true))
        })?;

        if record.enabled {
            self.invalidate_applied(&record.id);
        }
        info!("[SERVICE] Installed '{}' {}", record.id, record.version);
        Ok(record)
    }

    /// Re-fetches a mod from its recorded source.
    pub fn update(&self, id: &str) -> Result<UpdateOutcome, ModError> {
        let current = self.registry.get(id)?;
        let source = current
            .source
            .clone()
            .ok_or_else(|| ModError::InvalidSource(format!("mod '{}' has no source", id)))?;

        info!("[SERVICE] Updating '{}' from {}", id, source);
        let (manifest, assets) = self.fetcher.fetch_bundle(&source)?;
        let now = Utc::now();

        let record = self.registry.mutate(|mods| {
            let record = mods
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| ModError::NotFound(id.to_string()))?;
            record.apply_manifest(manifest, assets, now);
            Ok((record.clone(), true))
        })?;

        let reapply = record.enabled;
        if reapply {
            self.invalidate_applied(id);
        }
        info!("[SERVICE] Updated '{}' to {}", id, record.version);
        Ok(UpdateOutcome { record, reapply })
    }

    /// Updates every mod flagged with a pending update.
    ///
    /// A failing mod is reported and the rest still run.
    pub fn update_all(&self) -> BatchUpdate {
        let pending: Vec<String> = self
            .registry
            .list()
            .into_iter()
            .filter(|m| m.update_available.is_some())
            .map(|m| m.id)
            .collect();

        let mut batch = BatchUpdate::default();
        for id in pending {
            match self.update(&id) {
                Ok(outcome) => batch.updated.push(outcome.record),
                Err(e) => {
                    warn!("[SERVICE] Update of '{}' failed: {}", id, e);
                    batch.failed.push(FailedMod {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                        id,
                    });
                }
            }
        }
        batch
    }

    /// Deletes a non-default mod.
    ///
    /// Content already injected into open pages stays there.
    pub fn delete(&self, id: &str) -> Result<Mod, ModError> {
        self.registry.delete(id)
    }

    /// Enables or disables a mod.
    pub fn toggle(&self, id: &str, enabled: bool) -> Result<Mod, ModError> {
        let record = self.registry.set_enabled(id, enabled)?;
        info!(
            "[SERVICE] {} '{}'",
            if enabled { "Enabled" } else { "Disabled" },
            id
        );
        Ok(record)
    }

    /// Checks every sourced mod for updates.
    pub fn check_all_updates(&self) -> Result<Vec<UpdateInfo>, ModError> {
        self.checker.check_all()
    }

    /// Builds the user notification for a check result.
    #[must_use]
    pub fn notification(&self, updates: &[UpdateInfo]) -> Option<UpdateNotification> {
        update_notification(updates)
    }

    /// Starts periodic update checks.
    #[must_use]
    pub fn start_scheduler(&self) -> UpdateScheduler {
        UpdateScheduler::start(Arc::clone(&self.checker))
    }

    /// Merges the configured default mods.
    pub fn merge_defaults(&self) -> Result<MergeReport, ModError> {
        self.registry.merge_defaults(&self.defaults)
    }

    /// Returns the injection plan for a URL without recording anything.
    #[must_use]
    pub fn plan(&self, url: &str) -> Vec<Mod> {
        self.planner.plan(url, &self.registry)
    }

    /// Starts a page load in a tab.
    pub fn begin_navigation(&self, tab_id: TabId, url: &str) -> Result<PageLoad, ModError> {
        self.tracker.begin_navigation(tab_id, url)
    }

    /// Injects the planned mods not yet applied to this page load.
    ///
    /// Safe to call repeatedly for the same load.
    pub fn inject(
        &self,
        load: &PageLoad,
        injector: &dyn ScriptInjector,
    ) -> Result<InjectionReport, ModError> {
        let plan = self.planner.plan(&load.url, &self.registry);
        let claimed = self.tracker.claim(load, plan)?;
        Ok(apply_plan(load, &claimed, injector))
    }

    /// Handles a completed navigation: starts a load and injects into it.
    pub fn on_navigation(
        &self,
        tab_id: TabId,
        url: &str,
        injector: &dyn ScriptInjector,
    ) -> Result<InjectionReport, ModError> {
        let load = self.begin_navigation(tab_id, url)?;
        self.inject(&load, injector)
    }

    /// Forgets a closed tab.
    pub fn close_tab(&self, tab_id: TabId) -> Result<(), ModError> {
        self.tracker.close_tab(tab_id)
    }

    /// Returns registry statistics.
    pub fn stats(&self) -> Result<ModStats, ModError> {
        let mods = self.registry.list();
        Ok(ModStats {
            total: mods.len(),
            enabled: mods.iter().filter(|m| m.enabled).count(),
            updates_available: mods.iter().filter(|m| m.update_available.is_some()).count(),
            last_update_check: self.checker.last_checked()?,
        })
    }

    /// Returns all settings of a mod.
    pub fn mod_settings(&self, id: &str) -> Result<Map<String, Value>, ModError> {
        self.registry.get(id)?;
        self.read_settings(id)
    }

    /// Returns one setting of a mod.
    pub fn get_mod_setting(&self, id: &str, key: &str) -> Result<Option<Value>, ModError> {
        Ok(self.mod_settings(id)?.remove(key))
    }

    /// Stores one setting of a mod.
    pub fn set_mod_setting(&self, id: &str, key: &str, value: Value) -> Result<(), ModError> {
        self.registry.get(id)?;
        let _guard = self
            .settings_lock
            .lock()
            .map_err(|_| ModError::Store("settings lock poisoned".to_string()))?;

        let mut settings = self.read_settings(id)?;
        settings.insert(key.to_string(), value);
        self.registry.store().set(HashMap::from([(
            Mod::settings_key(id),
            Value::Object(settings),
        )]))
    }

    /// Exports the registry.
    #[must_use]
    pub fn export_backup(&self) -> BackupDocument {
        BackupDocument::export(&self.registry)
    }

    /// Replaces the registry with a backup.
    pub fn import_backup(&self, document: BackupDocument) -> Result<ImportReport, ModError> {
        self.registry.import_backup(document, &self.defaults)
    }

    /// Executes a command, reporting failure as data.
    pub fn handle(&self, command: Command) -> CommandResponse {
        match self.dispatch(command) {
            Ok(data) => CommandResponse::ok(data),
            Err(e) => {
                warn!("[SERVICE] Command failed: {}", e);
                CommandResponse::failed(e.kind(), &e.to_string())
            }
        }
    }

    /// Parses and executes a JSON command message.
    pub fn handle_json(&self, message: &str) -> CommandResponse {
        match serde_json::from_str::<Command>(message) {
            Ok(command) => self.handle(command),
            Err(e) => {
                warn!("[SERVICE] Rejected command message: {}", e);
                CommandResponse::failed("InvalidCommand", &e.to_string())
            }
        }
    }

    fn dispatch(&self, command: Command) -> Result<Value, ModError> {
        match command {
            Command::InstallMod(request) => {
                let source = request.into_source(&self.default_branch)?;
                to_data(&self.install(&source)?)
            }
            Command::UpdateMod { mod_id } => to_data(&self.update(&mod_id)?),
            Command::DeleteMod { mod_id } => to_data(&self.delete(&mod_id)?),
            Command::ToggleMod { mod_id, enabled } => to_data(&self.toggle(&mod_id, enabled)?),
            Command::CheckUpdates => {
                let updates = self.check_all_updates()?;
                to_data(&serde_json::json!({
                    "updates": updates,
                    "notification": self.notification(&updates),
                }))
            }
            Command::MergeDefaultMods => to_data(&self.merge_defaults()?),
            Command::UpdateAllMods => to_data(&self.update_all()),
        }
    }

    fn read_settings(&self, id: &str) -> Result<Map<String, Value>, ModError> {
        let key = Mod::settings_key(id);
        let mut values = self.registry.store().get(&[key.as_str()])?;
        Ok(match values.remove(&key) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        })
    }

    fn invalidate_applied(&self, id: &str) {
        if let Err(e) = self.tracker.invalidate(id) {
            warn!("[SERVICE] Could not schedule re-apply of '{}': {}", id, e);
        }
    }
}

fn check_default_source(default: &Mod, source: &ModSource) -> Result<(), ModError> {
    if default
        .source
        .as_ref()
        .is_some_and(|own| own.same_repository(source))
    {
        return Ok(());
    }
    warn!(
        "[SERVICE] Refusing to install {} over default mod '{}'",
        source, default.id
    );
    Err(ModError::ProtectedMod(default.id.clone()))
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, ModError> {
    Ok(serde_json::to_value(value)?)
}

/// Install request as sent by the UI: either `repository` or `owner` + `repo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InstallRequest {
    /// `owner/repo`, `owner/repo#branch` or a GitHub URL.
    #[serde(default)]
    pub repository: Option<String>,
    /// Repository owner.
    #[serde(default)]
    pub owner: Option<String>,
    /// Repository name.
    #[serde(default)]
    pub repo: Option<String>,
    /// Branch.
    #[serde(default)]
    pub branch: Option<String>,
}

impl InstallRequest {
    /// Resolves the request into a source.
    pub fn into_source(self, default_branch: &str) -> Result<ModSource, ModError> {
        let branch_override = self.branch.filter(|b| !b.trim().is_empty());

        let mut source = match (self.repository, self.owner, self.repo) {
            (Some(repository), _, _) => ModSource::parse(&repository, default_branch)?,
            (None, Some(owner), Some(repo)) => ModSource::new(&owner, &repo, default_branch)?,
            _ => {
                return Err(ModError::InvalidSource(
                    "expected 'repository' or 'owner' and 'repo'".to_string(),
                ));
            }
        };

        if let Some(branch) = branch_override {
            source.branch = branch.trim().to_string();
        }
        Ok(source)
    }
}

/// Messages accepted by [`ModService::handle`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    /// Install a mod from a repository.
    InstallMod(InstallRequest),
    /// Re-fetch a mod from its source.
    UpdateMod {
        #[serde(rename = "modId")]
        mod_id: String,
    },
    /// Delete a non-default mod.
    DeleteMod {
        #[serde(rename = "modId")]
        mod_id: String,
    },
    /// Enable or disable a mod.
    ToggleMod {
        #[serde(rename = "modId")]
        mod_id: String,
        enabled: bool,
    },
    /// Check every sourced mod for updates.
    CheckUpdates,
    /// Merge the default mods.
    #[serde(alias = "resetDefaultMods")]
    MergeDefaultMods,
    /// Update every mod with a pending update.
    UpdateAllMods,
}

/// Error half of a [`CommandResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandError {
    /// Stable error kind.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

/// Reply to a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    /// Whether the command succeeded.
    pub success: bool,
    /// Result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

impl CommandResponse {
    fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(kind: &str, message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CommandError {
                kind: kind.to_string(),
                message: message.to_string(),
            }),
        }
    }
}
