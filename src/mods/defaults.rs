//! Built-in default mods and their reconciliation into the registry.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use super::registry::ModRegistry;
use super::types::{Mod, ModAssets, ModError, ModSource};

/// Outcome of a default merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Defaults added because their id was absent.
    pub inserted: Vec<String>,
    /// Existing default mods whose content changed.
    pub refreshed: Vec<String>,
    /// Default ids already taken by a user-installed mod.
    pub collisions: Vec<String>,
    /// Default definitions skipped for being malformed or repeated.
    pub skipped: Vec<String>,
}

impl MergeReport {
    /// Returns true if the registry was modified.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.inserted.is_empty() || !self.refreshed.is_empty()
    }
}

/// Merges default definitions into a registry snapshot.
///
/// - absent id: inserted disabled
/// - present and default: every field replaced except `enabled`
/// - present and user-installed: left alone, reported as a collision
#[must_use]
pub fn merge_into(mods: &mut Vec<Mod>, defaults: &[Mod]) -> MergeReport {
    let mut report = MergeReport::default();
    let mut seen = HashSet::new();

    for default in defaults {
        if default.id.trim().is_empty()
            || default.name.trim().is_empty()
            || default.version.trim().is_empty()
        {
            warn!("[DEFAULTS] Skipping malformed default '{}'", default.id);
            report.skipped.push(default.id.clone());
            continue;
        }
        if !seen.insert(default.id.as_str()) {
            warn!("[DEFAULTS] Skipping repeated default '{}'", default.id);
            report.skipped.push(default.id.clone());
            continue;
        }

        match mods.iter_mut().find(|m| m.id == default.id) {
            None => {
                let mut record = default.clone();
                record.is_default = true;
                record.enabled = false;
                mods.push(record);
                report.inserted.push(default.id.clone());
            }
            Some(existing) if existing.is_default => {
                let mut record = default.clone();
                record.is_default = true;
                record.enabled = existing.enabled;
                if *existing != record {
                    *existing = record;
                    report.refreshed.push(default.id.clone());
                }
            }
            Some(_) => {
                warn!(
                    "[DEFAULTS] Default '{}' collides with a user-installed mod; keeping the user's",
                    default.id
                );
                report.collisions.push(default.id.clone());
            }
        }
    }

    report
}

impl ModRegistry {
    /// Reconciles default mods into the registry, persisting only on change.
    pub fn merge_defaults(&self, defaults: &[Mod]) -> Result<MergeReport, ModError> {
        let report = self.mutate(|mods| {
            let report = merge_into(mods, defaults);
            let changed = report.changed();
            Ok((report, changed))
        })?;

        info!(
            "[DEFAULTS] Merge: {} inserted, {} refreshed, {} collisions, {} skipped",
            report.inserted.len(),
            report.refreshed.len(),
            report.collisions.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

/// Mods shipped with the system.
#[must_use]
pub fn builtin_defaults() -> Vec<Mod> {
    let mut defaults = Vec::new();

    if let Ok(source) = ModSource::new("CodysTools", "dark-mode-mod", "main") {
        defaults.push(
            Mod::new("dark-mode", "Dark Mode Toggle", "1.0.0")
                .with_description("Adds a dark mode toggle to websites")
                .with_category("productivity")
                .with_source(source)
                .with_assets(ModAssets {
                    css: Some(DARK_MODE_CSS.to_string()),
                    js: Some(DARK_MODE_JS.to_string()),
                    ..ModAssets::default()
                })
                .as_default(),
        );
    }

    if let Ok(source) = ModSource::new("CodysTools", "ad-blocker-mod", "main") {
        defaults.push(
            Mod::new("ad-blocker", "Simple Ad Blocker", "1.0.0")
                .with_description("Blocks common ad elements on websites")
                .with_category("productivity")
                .with_source(source)
                .with_assets(ModAssets {
                    js: Some(AD_BLOCKER_JS.to_string()),
                    ..ModAssets::default()
                })
                .as_default(),
        );
    }

    defaults
}

const DARK_MODE_CSS: &str = "html.codystools-dark { filter: invert(0.9) hue-rotate(180deg); }\n\
html.codystools-dark img, html.codystools-dark video { filter: invert(1) hue-rotate(180deg); }\n";

const DARK_MODE_JS: &str = r#"const settings = (await mod.storage.get(`mod_${mod.id}_settings`)) || {};
if (settings.enabledByDefault !== false) {
  document.documentElement.classList.add('codystools-dark');
}
"#;

const AD_BLOCKER_JS: &str = r#"if (window.adBlockerInjected) return;
window.adBlockerInjected = true;
const selectors = ['[data-ad]', '.advertisement', '.adsbygoogle', '.banner-ad', '.sponsored', '.ad-container'];
const hide = () => selectors.forEach(s => document.querySelectorAll(s).forEach(el => { el.style.display = 'none'; }));
hide();
new MutationObserver(hide).observe(document.body, { childList: true, subtree: true });
"#;
