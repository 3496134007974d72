//! Configuration module for CodysTools.
//!
//! Handles loading and parsing the .codysrc configuration file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LogConfig;
use crate::mods::{
    DEFAULT_BRANCH, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_PRIVILEGED_SCHEMES, ManifestLayout,
    ServiceOptions, builtin_defaults,
};

/// Default update check interval in hours.
pub const DEFAULT_UPDATE_INTERVAL_HOURS: u64 = 24;

/// Upper bound for the fetch timeout in seconds.
const MAX_FETCH_TIMEOUT_SECS: u64 = 300;

/// Upper bound for the update interval in hours (one year).
const MAX_UPDATE_INTERVAL_HOURS: u64 = 24 * 365;

/// Default .codysrc file content with all settings documented.
const DEFAULT_CODYSRC: &str = r#"# CodysTools Configuration File
# =============================
# This file is read on startup.
# Lines starting with '#' are comments.
#
# Mod Store
# ---------
# Where the mod registry and mod settings are kept.
# store_path = ~/.codystools/mods.json

# Sources
# -------
# Branch used when a source does not name one (owner/repo#branch).
# default_branch = main
#
# How repository files are addressed:
#   raw       raw.githubusercontent.com, plain files (default)
#   contents  api.github.com contents API, base64 envelopes
# manifest_layout = raw
#
# Seconds before a manifest or asset request gives up (1-300).
# fetch_timeout = 15

# Updates
# -------
# Hours between scheduled update checks (1-8760).
# update_interval = 24

# Injection
# ---------
# URL prefixes mods are never injected into. May be repeated; entries are
# added to chrome:// and chrome-extension://.
# privileged_scheme = moz-extension://

# Logging Configuration
# ---------------------
# Logs are stored in ~/.codystools/logs/ with automatic cleanup.
#
# log_enabled = true       # Enable/disable file logging (true/false)
# log_level = info         # Log level: trace, debug, info, warn, error, off
# log_retention = 24       # Hours to keep log files (default: 24)
"#;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path to the JSON mod store.
    pub store_path: PathBuf,
    /// Branch used when a source does not name one.
    pub default_branch: String,
    /// Repository URL layout.
    pub manifest_layout: ManifestLayout,
    /// Request timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// Hours between scheduled update checks.
    pub update_interval_hours: u64,
    /// URL prefixes never injected into.
    pub privileged_schemes: Vec<String>,
    /// Path to config file.
    pub config_path: PathBuf,
    /// Logging configuration.
    pub log_config: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: Self::default_store_path(),
            default_branch: DEFAULT_BRANCH.to_string(),
            manifest_layout: ManifestLayout::default(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            update_interval_hours: DEFAULT_UPDATE_INTERVAL_HOURS,
            privileged_schemes: DEFAULT_PRIVILEGED_SCHEMES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            config_path: Self::default_config_path(),
            log_config: LogConfig::default(),
        }
    }
}

impl Config {
    /// Returns the default config file path (~/.codysrc).
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        home().join(".codysrc")
    }

    /// Returns the default store path (~/.codystools/mods.json).
    #[must_use]
    pub fn default_store_path() -> PathBuf {
        home().join(".codystools").join("mods.json")
    }

    /// Loads configuration from the default path, creating it if it doesn't exist.
    pub fn load() -> io::Result<Self> {
        let path = Self::default_config_path();
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path, creating it if it doesn't exist.
    pub fn load_from(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            Self::create_default_config(path)?;
        }

        let content = fs::read_to_string(path)?;
        let mut config = Self {
            config_path: path.to_path_buf(),
            ..Self::default()
        };
        config.parse(&content);
        Ok(config)
    }

    /// Parses configuration text on top of the defaults.
    #[must_use]
    pub fn from_str_content(content: &str) -> Self {
        let mut config = Self::default();
        config.parse(content);
        config
    }

    /// Request timeout.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Interval between scheduled update checks.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_hours * 3600)
    }

    /// Builds the mod service options.
    #[must_use]
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            default_branch: self.default_branch.clone(),
            layout: self.manifest_layout,
            check_interval: self.update_interval(),
            privileged_schemes: self.privileged_schemes.clone(),
            defaults: builtin_defaults(),
        }
    }

    /// Creates the default config file.
    fn create_default_config(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CODYSRC.as_bytes())?;
        Ok(())
    }

    /// Parses the config file content.
    fn parse(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                // Remove inline comments
                let value = value.split('#').next().unwrap_or(value).trim();

                self.apply_setting(key, value);
            }
        }
    }

    /// Applies a single setting.
    fn apply_setting(&mut self, key: &str, value: &str) {
        match key {
            "store_path" => {
                if !value.is_empty() {
                    self.store_path = expand_home(value);
                }
            }
            "default_branch" => {
                if !value.is_empty() {
                    self.default_branch = value.to_string();
                }
            }
            "manifest_layout" => {
                self.manifest_layout = ManifestLayout::parse(value).unwrap_or_default();
            }
            "fetch_timeout" => {
                self.fetch_timeout_secs = value
                    .parse::<u64>()
                    .map(|secs| secs.clamp(1, MAX_FETCH_TIMEOUT_SECS))
                    .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
            }
            "update_interval" => {
                self.update_interval_hours = value
                    .parse::<u64>()
                    .map(|hours| hours.clamp(1, MAX_UPDATE_INTERVAL_HOURS))
                    .unwrap_or(DEFAULT_UPDATE_INTERVAL_HOURS);
            }
            "privileged_scheme" => {
                let scheme = value.to_lowercase();
                if !scheme.is_empty() && !self.privileged_schemes.contains(&scheme) {
                    self.privileged_schemes.push(scheme);
                }
            }
            "log_level" => {
                self.log_config.level = LogConfig::parse_level(value);
            }
            "log_retention" | "log_retention_hours" => {
                self.log_config.retention_hours = LogConfig::parse_retention(value);
            }
            "log_enabled" | "logging" => {
                self.log_config.enabled = is_truthy(value);
            }
            _ => {}
        }
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => home().join(rest),
        None => PathBuf::from(value),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "yes" | "1" | "on")
}
