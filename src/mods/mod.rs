//! Mod engine for CodysTools.
//!
//! Keeps the registry of installed page mods, fetches their manifests from
//! GitHub repositories, checks for updates and plans which mods are injected
//! into a page.
//!
//! # Architecture
//!
//! - **types**: Core data structures (`Mod`, `ModSource`, `ModError`)
//! - **version**: Dotted version comparison
//! - **pattern**: Target-site matching
//! - **store**: Key-value persistence (`KeyValueStore`, `JsonFileStore`)
//! - **registry**: The ordered, id-unique mod registry
//! - **defaults**: Built-in default mods and their merge
//! - **manifest** / **github**: Manifest decoding and fetching
//! - **checker**: Update checks and the periodic scheduler
//! - **planner**: Injection planning and per-page tracking
//! - **backup**: Registry export and import
//! - **service**: `ModService`, the command surface
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use codystools::mods::{JsonFileStore, ModService, ReqwestTransport, ServiceOptions};
//!
//! let store = Arc::new(JsonFileStore::new("mods.json".into()));
//! let service = ModService::new(store, Arc::new(ReqwestTransport::default()), ServiceOptions::default())?;
//! service.merge_defaults()?;
//! let installed = service.install_from("owner/repo")?;
//! ```

mod backup;
mod checker;
mod defaults;
mod github;
mod manifest;
mod pattern;
mod planner;
mod registry;
mod service;
mod store;
mod types;
mod version;

pub use backup::{BACKUP_FORMAT_VERSION, BackupDocument, ImportReport};
pub use checker::{
    DEFAULT_CHECK_INTERVAL, LAST_CHECK_KEY, UpdateChecker, UpdateNotification, UpdateScheduler,
    update_notification,
};
pub use defaults::{MergeReport, builtin_defaults, merge_into};
pub use github::{
    DEFAULT_FETCH_TIMEOUT_SECS, HttpResponse, HttpTransport, ManifestFetcher, ManifestLayout,
    ReqwestTransport,
};
pub use manifest::{BodyShape, MANIFEST_FILE, Manifest, decode_manifest, detect_shape};
pub use pattern::{MATCH_ALL, TargetPattern, matches_url};
pub use planner::{
    DEFAULT_PRIVILEGED_SCHEMES, HostCapability, InjectionPlanner, InjectionReport,
    InjectionTracker, ModScope, PageLoad, ScriptInjector, TabId, apply_plan,
};
pub use registry::{MODS_KEY, ModRegistry};
pub use service::{
    BatchUpdate, Command, CommandError, CommandResponse, FailedMod, InstallRequest, ModService,
    ModStats, ServiceOptions, UpdateOutcome,
};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use types::{
    DEFAULT_BRANCH, DEFAULT_CATEGORY, Mod, ModAssets, ModError, ModSource, UpdateInfo,
    derive_mod_id,
};
pub use version::{DottedVersion, compare_versions, is_newer};
