//! CodysTools
//!
//! Mod registry and synchronization engine for CodysTools page mods.
//!
//! # Architecture
//!
//! - **Mods Module**: Registry, manifest fetching, update checks and
//!   injection planning
//! - **Config Module**: `.codysrc` settings
//! - **Logging Module**: File logging under `~/.codystools/logs/`
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use codystools::config::Config;
//! use codystools::mods::{JsonFileStore, ModService, ReqwestTransport};
//!
//! let config = Config::load().expect("Failed to load config");
//! let store = Arc::new(JsonFileStore::new(config.store_path.clone()));
//! let transport = Arc::new(ReqwestTransport::new(config.fetch_timeout()));
//! let service = ModService::new(store, transport, config.service_options())
//!     .expect("Failed to open mod store");
//! service.merge_defaults().expect("Failed to merge defaults");
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod logging;
pub mod mods;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export main types
pub use config::Config;
pub use mods::{Mod, ModError, ModRegistry, ModService};
