//! Registry export and import.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::defaults::{MergeReport, merge_into};
use super::registry::ModRegistry;
use super::types::{Mod, ModError};

/// Backup format version written by [`BackupDocument::export`].
pub const BACKUP_FORMAT_VERSION: &str = "1.0";

/// Serialized copy of the whole registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDocument {
    /// Format version.
    pub version: String,
    /// When the backup was taken.
    pub timestamp: DateTime<Utc>,
    /// Mods in registry order.
    pub mods: Vec<Mod>,
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Number of mods taken from the backup.
    pub imported: usize,
    /// Default merge run after the import.
    pub defaults: MergeReport,
}

impl BackupDocument {
    /// Captures the registry's current snapshot.
    #[must_use]
    pub fn export(registry: &ModRegistry) -> Self {
        Self {
            version: BACKUP_FORMAT_VERSION.to_string(),
            timestamp: Utc::now(),
            mods: registry.list(),
        }
    }

    /// Parses and validates a backup.
    pub fn parse(text: &str) -> Result<Self, ModError> {
        let document: Self =
            serde_json::from_str(text).map_err(|e| ModError::InvalidBackup(e.to_string()))?;
        document.validate()?;
        Ok(document)
    }

    /// Renders the backup as pretty JSON.
    pub fn to_json(&self) -> Result<String, ModError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ModError> {
        let mut seen = HashSet::new();
        for record in &self.mods {
            if record.id.trim().is_empty() {
                return Err(ModError::InvalidBackup("mod without id".to_string()));
            }
            if !seen.insert(record.id.as_str()) {
                return Err(ModError::InvalidBackup(format!(
                    "duplicate mod id '{}'",
                    record.id
                )));
            }
        }
        Ok(())
    }
}

impl ModRegistry {
    /// Replaces the registry with a backup, then re-merges the defaults.
    ///
    /// Records sharing an id with a default get their default flag back,
    /// other records lose it, and defaults missing from the backup are
    /// inserted again. The result is
    /// persisted in one write.
    pub fn import_backup(
        &self,
        document: BackupDocument,
        defaults: &[Mod],
    ) -> Result<ImportReport, ModError> {
        document.validate()?;
        let default_ids: HashSet<&str> = defaults.iter().map(|d| d.id.as_str()).collect();

        let report = self.mutate(|mods| {
            let mut records = document.mods;
            for record in &mut records {
                record.is_default = default_ids.contains(record.id.as_str());
            }

            let imported = records.len();
            *mods = records;
            let merge = merge_into(mods, defaults);
            Ok((
                ImportReport {
                    imported,
                    defaults: merge,
                },
                true,
            ))
        })?;

        info!(
            "[REGISTRY] Imported {} mods ({} defaults restored)",
            report.imported,
            report.defaults.inserted.len()
        );
        Ok(report)
    }
}
