//! ctibridge configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::DEFAULT_CHANNEL_CAPACITY;
use crate::relay::normalize_origin;

/// Main ctibridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Origins of the two framed applications
    pub bridge: BridgeConfig,

    /// Heartbeat timing
    pub heartbeat: HeartbeatConfig,

    /// Broadcast channel settings
    pub channel: ChannelConfig,

    /// Host widget presentation
    pub widget: WidgetConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Origins must be absolute http(s) URLs and timings must be non-zero.
    pub fn validate(&self) -> Result<()> {
        normalize_origin(&self.bridge.flex_origin).context("Invalid bridge.flex-origin")?;
        normalize_origin(&self.bridge.host_origin).context("Invalid bridge.host-origin")?;

        if self.heartbeat.interval_ms == 0 || self.heartbeat.sweep_interval_ms == 0 {
            return Err(eyre::eyre!("Heartbeat intervals must be greater than zero"));
        }
        if self.heartbeat.stale_threshold_ms < self.heartbeat.interval_ms {
            return Err(eyre::eyre!(
                "heartbeat.stale-threshold-ms ({}) must be at least heartbeat.interval-ms ({})",
                self.heartbeat.stale_threshold_ms,
                self.heartbeat.interval_ms
            ));
        }
        if self.channel.prefix.trim().is_empty() {
            return Err(eyre::eyre!("channel.prefix must not be empty"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .ctibridge.yml
        let local_config = PathBuf::from(".ctibridge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/ctibridge/ctibridge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ctibridge").join("ctibridge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Origins of the host widget and the agent desktop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Origin of the embedded agent desktop
    #[serde(rename = "flex-origin")]
    pub flex_origin: String,

    /// Origin of the host widget, as seen by the agent desktop plugin
    #[serde(rename = "host-origin")]
    pub host_origin: String,

    /// Path of the agent desktop page the primary embeds
    #[serde(rename = "agent-desktop-path")]
    pub agent_desktop_path: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            flex_origin: "https://flex.twilio.com".to_string(),
            host_origin: "https://app.hubspot.com".to_string(),
            agent_desktop_path: "/agent-dashboard".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn flex_origin(&self) -> Result<String> {
        normalize_origin(&self.flex_origin)
    }

    pub fn host_origin(&self) -> Result<String> {
        normalize_origin(&self.host_origin)
    }

    /// URL the primary context loads into its agent desktop frame
    pub fn agent_desktop_url(&self) -> Result<String> {
        let origin = self.flex_origin()?;
        let path = self.agent_desktop_path.trim_start_matches('/');
        Ok(format!("{}/{}", origin, path))
    }
}

/// Heartbeat timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// How often a secondary pings the primary
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Silence after which a peer counts as gone
    #[serde(rename = "stale-threshold-ms")]
    pub stale_threshold_ms: u64,

    /// How often the primary sweeps stale peers
    #[serde(rename = "sweep-interval-ms")]
    pub sweep_interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            stale_threshold_ms: 10_000,
            sweep_interval_ms: 5_000,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Broadcast channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Name of the shared channel; dedicated and state channels derive from it
    pub prefix: String,

    /// Buffered messages per channel
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            prefix: "twilio-flex-hubspot-cti".to_string(),
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Host widget presentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Compact width of a secondary widget
    #[serde(rename = "remote-width")]
    pub remote_width: u32,

    /// Compact height of a secondary widget
    #[serde(rename = "remote-height")]
    pub remote_height: u32,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            remote_width: 450,
            remote_height: 225,
        }
    }
}
