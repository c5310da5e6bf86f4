//! Configuration management
//!
//! Settings live in `<data dir>/settings.json`:
//! ```json
//! {
//!   "catalogPath": "/path/to/catalog.json",
//!   "minConditions": 1
//! }
//! ```
//! Keys this crate does not manage are preserved on save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::result::Error;
use crate::domain::Catalogs;

/// Default minimum number of conditions a saved policy must have
pub const DEFAULT_MIN_CONDITIONS: usize = 1;

fn default_min_conditions() -> usize {
    DEFAULT_MIN_CONDITIONS
}

/// Raw settings.json structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    catalog_path: Option<PathBuf>,
    #[serde(default = "default_min_conditions")]
    min_conditions: usize,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            catalog_path: None,
            min_conditions: DEFAULT_MIN_CONDITIONS,
            other: HashMap::new(),
        }
    }
}

/// Ledgerguard configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Custom field/operator catalog; built-in catalog when unset
    pub catalog_path: Option<PathBuf>,
    /// Minimum conditions a policy needs before it can be saved
    pub min_conditions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: None,
            min_conditions: DEFAULT_MIN_CONDITIONS,
        }
    }
}

impl Config {
    /// Load config from the data directory
    ///
    /// Environment variables take precedence over the file:
    /// `LEDGERGUARD_CATALOG` and `LEDGERGUARD_MIN_CONDITIONS`.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let raw = read_settings(data_dir)?;

        let catalog_path = match std::env::var("LEDGERGUARD_CATALOG") {
            Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => raw.catalog_path,
        };

        let min_conditions =
            parse_min_conditions(std::env::var("LEDGERGUARD_MIN_CONDITIONS").ok().as_deref())?
                .unwrap_or(raw.min_conditions);

        Ok(Self {
            catalog_path,
            min_conditions,
        })
    }

    /// Save config, preserving settings this crate doesn't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let mut settings = read_settings(data_dir)?;
        settings.catalog_path = self.catalog_path.clone();
        settings.min_conditions = self.min_conditions;

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(data_dir.join("settings.json"), content)?;
        Ok(())
    }

    /// Catalogs to use: the configured file, or the built-in catalog
    pub fn catalogs(&self) -> Result<Catalogs> {
        match &self.catalog_path {
            Some(path) => Ok(Catalogs::load(path)?),
            None => Ok(Catalogs::default()),
        }
    }
}

/// Value of `LEDGERGUARD_MIN_CONDITIONS`; unset or blank means no override
fn parse_min_conditions(raw: Option<&str>) -> Result<Option<usize>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<usize>().map(Some).map_err(|_| {
            Error::Config(format!(
                "LEDGERGUARD_MIN_CONDITIONS must be a non-negative integer, got '{}'",
                value
            ))
            .into()
        }),
    }
}

/// A missing or unreadable settings file falls back to defaults
fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}
