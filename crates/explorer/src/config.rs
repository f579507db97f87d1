//! Explorer configuration management

use crate::session::discovery::MAX_SETTLE_SECS;
use crate::session::{DiscoveryAction, Timing, TransactionTimeouts, default_script};
use anyhow::{Context, Result, anyhow};
use protocol::{BitSpec, STATUS_BITS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default)]
    pub explorer: ExplorerSettings,
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    /// Operator-defined bits reported after the built-in fields
    ///
    /// ```toml
    /// [[bits]]
    /// name = "scan_held"
    /// label = "scan button held"
    /// byte = 4
    /// bit = 5
    /// ```
    #[serde(default)]
    pub bits: Vec<BitSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerSettings {
    pub log_level: String,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Poll cadence and transfer timeouts, all in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub poll_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub data_timeout_ms: u64,
    pub status_timeout_ms: u64,
    pub discovery_lead_in_ms: u64,
    /// Delay between attempts to reopen a scanner that disappeared
    pub reconnect_interval_ms: u64,
    /// How long each doctor check waits for the expected state
    pub doctor_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            error_backoff_ms: 1000,
            data_timeout_ms: 1000,
            status_timeout_ms: 200,
            discovery_lead_in_ms: 500,
            reconnect_interval_ms: 2000,
            doctor_timeout_ms: 15000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    pub actions: Vec<DiscoveryAction>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            actions: default_script(),
        }
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            explorer: ExplorerSettings::default(),
            timing: TimingSettings::default(),
            discovery: DiscoverySettings::default(),
            bits: Vec::new(),
        }
    }
}

impl ExplorerConfig {
    /// Load configuration from the specified path
    ///
    /// Without a path the standard locations are tried in order; finding none
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            expand_path(p)
        } else {
            Self::candidate_paths()
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    ///
    /// An explicit `path` must load; only the standard locations fall back.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if path.is_some() {
            return Self::load(path);
        }
        match Self::load(None) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::debug!("{:#}", e);
                Ok(Self::default())
            }
        }
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: ExplorerConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let path = expand_path(path);
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("s1500-explore").join("explorer.toml")
        } else {
            PathBuf::from(".config/s1500-explore/explorer.toml")
        }
    }

    fn candidate_paths() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/s1500-explore/explorer.toml"),
        ]
    }

    /// Loop delays derived from `[timing]`
    pub fn timing(&self) -> Timing {
        Timing {
            poll_interval: Duration::from_millis(self.timing.poll_interval_ms),
            error_backoff: Duration::from_millis(self.timing.error_backoff_ms),
            discovery_lead_in: Duration::from_millis(self.timing.discovery_lead_in_ms),
            reconnect_interval: Duration::from_millis(self.timing.reconnect_interval_ms),
            doctor_timeout: Duration::from_millis(self.timing.doctor_timeout_ms),
            ..Timing::default()
        }
    }

    /// Per-phase transfer timeouts derived from `[timing]`
    pub fn timeouts(&self) -> TransactionTimeouts {
        TransactionTimeouts {
            data: Duration::from_millis(self.timing.data_timeout_ms),
            status: Duration::from_millis(self.timing.status_timeout_ms),
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        validate_log_level(&self.explorer.log_level)?;

        if self.timing.data_timeout_ms == 0 || self.timing.status_timeout_ms == 0 {
            return Err(anyhow!("Transfer timeouts must be greater than zero"));
        }
        if self.timing.reconnect_interval_ms == 0 || self.timing.doctor_timeout_ms == 0 {
            return Err(anyhow!(
                "reconnect_interval_ms and doctor_timeout_ms must be greater than zero"
            ));
        }

        if self.discovery.actions.is_empty() {
            return Err(anyhow!(
                "Discovery needs at least one action (the first one is the baseline)"
            ));
        }
        for action in &self.discovery.actions {
            if action.label.trim().is_empty() {
                return Err(anyhow!("Empty label in discovery actions"));
            }
            if action.settle_secs > MAX_SETTLE_SECS {
                return Err(anyhow!(
                    "Settle time for '{}' is {}s, the limit is {}s",
                    action.label,
                    action.settle_secs,
                    MAX_SETTLE_SECS
                ));
            }
        }

        for (i, spec) in self.bits.iter().enumerate() {
            spec.validate()?;
            let clashes_builtin = STATUS_BITS.iter().any(|b| b.name == spec.name);
            let clashes_earlier = self.bits[..i].iter().any(|b| b.name == spec.name);
            if clashes_builtin || clashes_earlier {
                return Err(anyhow!("Duplicate bit name '{}'", spec.name));
            }
        }

        Ok(())
    }
}

/// Check a log level against the levels tracing understands
pub fn validate_log_level(level: &str) -> Result<()> {
    if !VALID_LOG_LEVELS.contains(&level) {
        return Err(anyhow!(
            "Invalid log level '{}', must be one of: {}",
            level,
            VALID_LOG_LEVELS.join(", ")
        ));
    }
    Ok(())
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}
