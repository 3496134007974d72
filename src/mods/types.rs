//! Mod type definitions.
//!
//! Core data structures shared by the registry, the fetcher and the planner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::manifest::Manifest;

/// Branch used when a source does not name one.
pub const DEFAULT_BRANCH: &str = "main";

/// Category assigned when a manifest does not carry one.
pub const DEFAULT_CATEGORY: &str = "uncategorized";

/// Remote repository a mod is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModSource {
    /// Repository owner (user or organisation).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch to fetch from.
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

impl ModSource {
    /// Creates a source from its parts.
    pub fn new(owner: &str, repo: &str, branch: &str) -> Result<Self, ModError> {
        let owner = owner.trim();
        let repo = repo.trim().trim_end_matches(".git");
        let branch = branch.trim();

        if owner.is_empty() || repo.is_empty() {
            return Err(ModError::InvalidSource(format!("{}/{}", owner, repo)));
        }
        if owner.contains('/') || repo.contains('/') {
            return Err(ModError::InvalidSource(format!(
                "owner and repo must not contain '/': {}/{}",
                owner, repo
            )));
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: if branch.is_empty() {
                default_branch()
            } else {
                branch.to_string()
            },
        })
    }

    /// Creates a source from the `owner/repo` repository form.
    pub fn from_repository(repository: &str, branch: &str) -> Result<Self, ModError> {
        let (owner, repo) = repository
            .trim()
            .split_once('/')
            .ok_or_else(|| ModError::InvalidSource(repository.to_string()))?;
        Self::new(owner, repo, branch)
    }

    /// Parses user input into a source.
    ///
    /// Accepts `owner/repo`, `owner/repo#branch` and
    /// `https://github.com/owner/repo[/tree/branch]`.
    pub fn parse(input: &str, default_branch: &str) -> Result<Self, ModError> {
        let input = input.trim();

        let path = input
            .strip_prefix("https://github.com/")
            .or_else(|| input.strip_prefix("http://github.com/"))
            .or_else(|| input.strip_prefix("github.com/"));

        if let Some(path) = path {
            let parts: Vec<&str> = path.trim_end_matches('/').split('/').collect();
            return match parts.as_slice() {
                [owner, repo] => Self::new(owner, repo, default_branch),
                [owner, repo, "tree", branch @ ..] if !branch.is_empty() => {
                    Self::new(owner, repo, &branch.join("/"))
                }
                _ => Err(ModError::InvalidSource(input.to_string())),
            };
        }

        match input.split_once('#') {
            Some((repository, branch)) => Self::from_repository(repository, branch),
            None => Self::from_repository(input, default_branch),
        }
    }

    /// Returns the repository in `owner/repo` form.
    #[must_use]
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Returns the registry id for mods installed from this source.
    #[must_use]
    pub fn mod_id(&self) -> String {
        derive_mod_id(&self.owner, &self.repo)
    }

    /// Returns true if both sources name the same repository, ignoring case
    /// and branch.
    #[must_use]
    pub fn same_repository(&self, other: &Self) -> bool {
        self.owner.eq_ignore_ascii_case(&other.owner) && self.repo.eq_ignore_ascii_case(&other.repo)
    }
}

impl std::fmt::Display for ModSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.branch)
    }
}

/// Derives the stable id of a repository-sourced mod.
///
/// `owner-repo`, lower-cased, keeping only `[a-z0-9-]`.
#[must_use]
pub fn derive_mod_id(owner: &str, repo: &str) -> String {
    format!("{}-{}", owner, repo)
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Style and script content of a mod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModAssets {
    /// Stylesheet injected into matching pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    /// Script executed in matching pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js: Option<String>,
    /// Settings page markup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_html: Option<String>,
    /// Settings page script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_js: Option<String>,
}

impl ModAssets {
    /// Returns true if nothing would be injected into a page.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.css.is_none() && self.js.is_none()
    }
}

/// A mod known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mod {
    /// Registry-unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display description.
    #[serde(default)]
    pub description: String,
    /// Display category.
    #[serde(default = "default_category")]
    pub category: String,
    /// Dotted numeric version.
    pub version: String,
    /// Whether the mod is injected into matching pages.
    #[serde(default)]
    pub enabled: bool,
    /// Shipped with the system; cannot be deleted.
    #[serde(default)]
    pub is_default: bool,
    /// URL patterns; empty means every URL.
    #[serde(default)]
    pub target_sites: Vec<String>,
    /// Where the manifest and assets come from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ModSource>,
    /// Injected content.
    #[serde(default)]
    pub assets: ModAssets,
    /// First install time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
    /// Last successful fetch or install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Newer remote version found by the last update check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_available: Option<String>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Mod {
    /// Creates a disabled, non-default mod with no content.
    #[must_use]
    pub fn new(id: &str, name: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            category: default_category(),
            version: version.to_string(),
            enabled: false,
            is_default: false,
            target_sites: Vec::new(),
            source: None,
            assets: ModAssets::default(),
            installed_at: None,
            last_updated: None,
            update_available: None,
        }
    }

    /// Builds a fresh installed record from a fetched manifest.
    #[must_use]
    pub fn from_manifest(
        source: ModSource,
        manifest: Manifest,
        assets: ModAssets,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self::new(&source.mod_id(), &manifest.name, &manifest.version);
        record.source = Some(source);
        record.installed_at = Some(now);
        record.apply_manifest(manifest, assets, now);
        record
    }

    /// Replaces the content fields from a fetched manifest.
    ///
    /// `enabled`, `is_default`, `source` and `installed_at` are left as-is.
    pub fn apply_manifest(&mut self, manifest: Manifest, assets: ModAssets, now: DateTime<Utc>) {
        self.name = manifest.name;
        self.description = manifest.description;
        self.category = manifest.category;
        self.version = manifest.version;
        self.target_sites = manifest.target_sites;
        self.assets = assets;
        self.last_updated = Some(now);
        self.update_available = None;
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    /// Sets the target sites.
    #[must_use]
    pub fn with_target_sites(mut self, sites: &[&str]) -> Self {
        self.target_sites = sites.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Sets the source.
    #[must_use]
    pub fn with_source(mut self, source: ModSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the assets.
    #[must_use]
    pub fn with_assets(mut self, assets: ModAssets) -> Self {
        self.assets = assets;
        self
    }

    /// Marks the mod as shipped with the system.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Store key holding this mod's settings.
    #[must_use]
    pub fn settings_key(id: &str) -> String {
        format!("mod_{}_settings", id)
    }
}

/// A mod with a newer remote version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    /// Mod id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Installed version.
    pub current_version: String,
    /// Remote version.
    pub new_version: String,
}

/// Mod engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModError {
    /// No mod with this id.
    #[error("Mod '{0}' not found")]
    NotFound(String),
    /// Remote manifest or file is absent.
    #[error("Not found at {0}")]
    ManifestNotFound(String),
    /// Default mods cannot be deleted or replaced from another repository.
    #[error("Mod '{0}' is a protected default mod")]
    ProtectedMod(String),
    /// Manifest lacks required fields or cannot be decoded.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
    /// Transport error or non-success response.
    #[error("Fetch failed: {0}")]
    FetchFailed(String),
    /// Remote did not answer in time.
    #[error("Timed out fetching {0}")]
    Timeout(String),
    /// Source reference cannot be used.
    #[error("Invalid source: {0}")]
    InvalidSource(String),
    /// Backup document cannot be imported.
    #[error("Invalid backup: {0}")]
    InvalidBackup(String),
    /// Key-value store or lock failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl ModError {
    /// Stable kind string reported across the command surface.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::ManifestNotFound(_) => "NotFound",
            Self::ProtectedMod(_) => "ProtectedMod",
            Self::InvalidManifest(_) => "InvalidManifest",
            Self::FetchFailed(_) => "FetchFailed",
            Self::Timeout(_) => "Timeout",
            Self::InvalidSource(_) => "InvalidSource",
            Self::InvalidBackup(_) => "InvalidBackup",
            Self::Store(_) => "StoreError",
        }
    }
}

impl From<serde_json::Error> for ModError {
    fn from(e: serde_json::Error) -> Self {
        ModError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_mod_id() {
        assert_eq!(derive_mod_id("a", "b"), "a-b");
        assert_eq!(derive_mod_id("CodysTools", "Dark_Mode.Mod"), "codystools-darkmodemod");
        assert_eq!(derive_mod_id("Some One", "x!y"), "someone-xy");
    }

    #[test]
    fn test_source_parse_forms() {
        let s = ModSource::parse("owner/repo", "main").unwrap();
        assert_eq!(s.branch, "main");
        assert_eq!(s.repository(), "owner/repo");

        let s = ModSource::parse("owner/repo#dev", "main").unwrap();
        assert_eq!(s.branch, "dev");

        let s = ModSource::parse("https://github.com/owner/repo.git", "main").unwrap();
        assert_eq!(s.repo, "repo");

        let s = ModSource::parse("https://github.com/owner/repo/tree/feature/x", "main").unwrap();
        assert_eq!(s.branch, "feature/x");
    }

    #[test]
    fn test_source_parse_rejects_garbage() {
        assert!(ModSource::parse("no-slash", "main").is_err());
        assert!(ModSource::parse("/repo", "main").is_err());
        assert!(ModSource::parse("a/b/c", "main").is_err());
        assert!(ModSource::parse("https://github.com/only", "main").is_err());
    }

    #[test]
    fn test_mod_serde_uses_camel_case() {
        let m = Mod::new("x", "X", "1.0.0").as_default();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["isDefault"], true);
        assert_eq!(json["targetSites"], serde_json::json!([]));
        assert!(json.get("updateAvailable").is_none());
    }

    #[test]
    fn test_mod_deserialize_fills_defaults() {
        let m: Mod = serde_json::from_str(r#"{"id":"a","name":"A","version":"1"}"#).unwrap();
        assert!(!m.enabled);
        assert!(!m.is_default);
        assert_eq!(m.category, DEFAULT_CATEGORY);
        assert!(m.assets.is_empty());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ModError::NotFound("x".into()).kind(), "NotFound");
        assert_eq!(ModError::ManifestNotFound("u".into()).kind(), "NotFound");
        assert_eq!(ModError::ProtectedMod("x".into()).kind(), "ProtectedMod");
        assert_eq!(ModError::Timeout("u".into()).kind(), "Timeout");
    }
}
