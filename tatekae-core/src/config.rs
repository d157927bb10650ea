//! Configuration management
//!
//! Settings live in settings.json in the data directory:
//! ```json
//! {
//!   "app": { "defaultProject": "Okinawa trip" },
//!   "settlement": { "memo": "bulk settlement" },
//!   "balance": { "referencePolicy": "skip" }
//! }
//! ```
//! Keys this crate does not manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::ReferencePolicy;
use crate::services::DEFAULT_SETTLEMENT_MEMO;

const SETTINGS_FILE: &str = "settings.json";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    settlement: SettlementSettings,
    #[serde(default)]
    balance: BalanceSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_project: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettlementSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memo: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reference_policy: Option<ReferencePolicy>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Tatekae configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    /// Project name or id used when a command does not name one
    pub default_project: Option<String>,
    /// Memo written on settlement records
    pub settlement_memo: String,
    pub reference_policy: ReferencePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_project: None,
            settlement_memo: DEFAULT_SETTLEMENT_MEMO.to_string(),
            reference_policy: ReferencePolicy::default(),
        }
    }
}

impl Config {
    /// Load config from the data directory.
    ///
    /// Environment overrides:
    /// - `TATEKAE_PROJECT` replaces the default project
    /// - `TATEKAE_REFERENCE_POLICY` replaces the reference policy
    pub fn load(data_dir: &Path) -> Result<Self> {
        let raw = read_settings(data_dir)?;

        let default_project = std::env::var("TATEKAE_PROJECT")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .or(raw.app.default_project);

        let reference_policy = match std::env::var("TATEKAE_REFERENCE_POLICY") {
            Ok(value) => value
                .parse::<ReferencePolicy>()
                .with_context(|| format!("Invalid TATEKAE_REFERENCE_POLICY '{}'", value))?,
            Err(_) => raw.balance.reference_policy.unwrap_or_default(),
        };

        let settlement_memo = raw
            .settlement
            .memo
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SETTLEMENT_MEMO.to_string());

        Ok(Self {
            default_project,
            settlement_memo,
            reference_policy,
        })
    }

    /// Save config to the data directory, preserving settings this crate
    /// doesn't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let mut settings = read_settings(data_dir)?;

        settings.app.default_project = self.default_project.clone();
        settings.settlement.memo = Some(self.settlement_memo.clone());
        settings.balance.reference_policy = Some(self.reference_policy);

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(data_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }

    pub fn set_default_project(&mut self, project: impl Into<String>) {
        self.default_project = Some(project.into());
    }

    pub fn clear_default_project(&mut self) {
        self.default_project = None;
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let path = data_dir.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&path)?;
    match serde_json::from_str(&content) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
            Ok(SettingsFile::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert_eq!(config.settlement_memo, DEFAULT_SETTLEMENT_MEMO);
        assert_eq!(config.reference_policy, ReferencePolicy::Skip);
    }

    #[test]
    fn test_reads_settings() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{
                "app": { "defaultProject": "Flat" },
                "settlement": { "memo": "精算" },
                "balance": { "referencePolicy": "reject" }
            }"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.settlement_memo, "精算");
        assert_eq!(config.reference_policy, ReferencePolicy::Reject);
        // TATEKAE_PROJECT may be set in the environment running the tests
        if std::env::var("TATEKAE_PROJECT").is_err() {
            assert_eq!(config.default_project.as_deref(), Some("Flat"));
        }
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(
            &path,
            r#"{ "app": { "theme": "dark" }, "plugins": { "x": 1 } }"#,
        )
        .unwrap();

        let mut config = Config::load(dir.path()).unwrap();
        config.set_default_project("Trip");
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["app"]["theme"], "dark");
        assert_eq!(saved["app"]["defaultProject"], "Trip");
        assert_eq!(saved["plugins"]["x"], 1);
        assert_eq!(saved["settlement"]["memo"], DEFAULT_SETTLEMENT_MEMO);
    }
}
