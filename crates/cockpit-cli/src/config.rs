//! Configuration file handling for the cockpit CLI

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use cockpit_client::{PanelConfig, SessionPolicy, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};

/// Backend URL when neither the CLI nor the config file names one
pub const DEFAULT_SERVER: &str = "http://localhost:8000";

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default backend URL
    pub server: Option<String>,
    /// Request timeout in seconds, 0 waits indefinitely
    pub timeout_secs: Option<u64>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Run one polling transition at a time
    pub serialize_transitions: Option<bool>,
    /// Reject zero or negative polling intervals before sending
    pub reject_non_positive_interval: Option<bool>,
    /// Drop results of calls overtaken by a newer call on the same region
    pub supersede_stale: Option<bool>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("cockpit");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        server: Option<&str>,
        timeout_secs: Option<u64>,
        no_color: bool,
    ) -> MergedConfig {
        let timeout = match timeout_secs.or(self.timeout_secs) {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_TIMEOUT),
        };

        MergedConfig {
            server: server
                .map(String::from)
                .or_else(|| self.server.clone())
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            timeout,
            no_color: no_color || self.no_color.unwrap_or(false),
            panel: PanelConfig {
                session: SessionPolicy {
                    serialize_transitions: self.serialize_transitions.unwrap_or(false),
                    reject_non_positive_interval: self
                        .reject_non_positive_interval
                        .unwrap_or(false),
                },
                supersede_stale: self.supersede_stale.unwrap_or(true),
            },
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub server: String,
    pub timeout: Option<Duration>,
    pub no_color: bool,
    pub panel: PanelConfig,
}
