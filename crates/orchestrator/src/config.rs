use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::preset::ConfiguredPresets;

/// Configuration for submitting encode jobs and handling their notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Processor name the remote service knows the encoder engine by
    pub engine_name: String,
    /// Callback endpoint used when a submission doesn't name one
    pub callback_endpoint: Option<Url>,
    /// Name the callback endpoint is registered under
    pub notification_endpoint_name: String,
    /// Container finished outputs are copied into when a submission doesn't name one
    pub default_output_container: Option<Url>,
    /// Preset name -> engine configuration
    pub presets: BTreeMap<String, String>,
    /// Pass unknown preset names to the engine as-is instead of failing
    pub passthrough_unknown_presets: bool,
    /// Interval in seconds between job state polls
    pub poll_interval_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl OrchestratorConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            engine_name: "Media Encoder Standard".to_string(),
            callback_endpoint: None,
            notification_endpoint_name: "AmsV2Callback".to_string(),
            default_output_container: None,
            presets: BTreeMap::new(),
            passthrough_unknown_presets: false,
            poll_interval_secs: 10,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                config = Self::parse(&content, config_path)?;
            }
        }

        Ok(config)
    }

    /// Parse `content` as TOML when `origin` has a `.toml` extension, JSON otherwise
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        if origin.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(content).with_context(|| format!("Failed to parse TOML config: {}", origin.display()))
        } else {
            serde_json::from_str(content).with_context(|| format!("Failed to parse JSON config: {}", origin.display()))
        }
    }

    pub fn preset_resolver(&self) -> ConfiguredPresets {
        ConfiguredPresets::new(self.presets.clone()).with_passthrough_unknown(self.passthrough_unknown_presets)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
