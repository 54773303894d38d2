//! ---
//! keel_section: "01-core-functionality"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Shared primitives and utilities for the patch and lifecycle engines."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::logging::LogFormat;

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_file_prefix() -> String {
    "keel".to_owned()
}

/// Primary configuration object for a Keel-managed process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeelConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub stores: StoreConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Metadata describing where a [`KeelConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedKeelConfig {
    pub config: KeelConfig,
    pub source: PathBuf,
}

impl KeelConfig {
    pub const ENV_CONFIG_PATH: &str = "KEEL_CONFIG";

    /// Load configuration from disk, respecting the `KEEL_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedKeelConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedKeelConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedKeelConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Like [`KeelConfig::load`], but an absent file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        let env_set = std::env::var(Self::ENV_CONFIG_PATH)
            .map(|path| !path.trim().is_empty())
            .unwrap_or(false);
        if !env_set && !candidates.iter().any(|c| c.as_ref().exists()) {
            debug!("no configuration file present; using defaults");
            return Ok(Self::default());
        }
        Self::load(candidates)
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<KeelConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.stores.validate()
    }
}

impl std::str::FromStr for KeelConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: KeelConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the rolling JSON log file; stdout only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: default_log_format(),
            file_prefix: default_file_prefix(),
        }
    }
}

/// Locations of the file-backed stores. Unset paths mean in-memory stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub versions: Option<PathBuf>,
    #[serde(default)]
    pub lifecycle: Option<PathBuf>,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if let (Some(versions), Some(lifecycle)) = (&self.versions, &self.lifecycle) {
            if versions == lifecycle {
                return Err(anyhow!(
                    "version and lifecycle stores must not share a file ({})",
                    versions.display()
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default)]
    pub missing_action_policy: MissingActionPolicy,
}

/// How `setup`/`cleanup` treat a module that declares no such action.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MissingActionPolicy {
    /// Treat the missing action as an idempotent no-op and record completion.
    #[default]
    Vacuous,
    /// Reject explicit requests for a missing action.
    Strict,
}
