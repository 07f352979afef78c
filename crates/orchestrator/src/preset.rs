use std::collections::BTreeMap;

use crate::error::{OrchestratorError, Result};

/// Turns a preset name into the configuration string the encoder engine accepts
pub trait PresetResolver: Send + Sync {
    fn resolve(&self, preset_name: &str) -> Result<String>;
}

/// True when `preset` is already a structured (JSON or XML) configuration
pub fn is_structured(preset: &str) -> bool {
    let trimmed = preset.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('<')
}

/// Resolver over a fixed name → configuration table, usually taken from config.
///
/// Names match case-insensitively. Structured configurations pass through untouched, and
/// so do names when `passthrough_unknown` is set (the engine knows its own built-in presets).
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPresets {
    presets: BTreeMap<String, String>,
    passthrough_unknown: bool,
}

impl ConfiguredPresets {
    pub fn new(presets: BTreeMap<String, String>) -> Self {
        Self {
            presets,
            passthrough_unknown: false,
        }
    }

    pub fn with_passthrough_unknown(mut self, passthrough: bool) -> Self {
        self.passthrough_unknown = passthrough;
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }
}

impl PresetResolver for ConfiguredPresets {
    fn resolve(&self, preset_name: &str) -> Result<String> {
        if preset_name.trim().is_empty() {
            return Err(OrchestratorError::validation("preset name is empty"));
        }

        if is_structured(preset_name) {
            return Ok(preset_name.to_string());
        }

        let name = preset_name.trim();
        if let Some(configuration) = self
            .presets
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, configuration)| configuration)
        {
            return Ok(configuration.clone());
        }

        if self.passthrough_unknown {
            return Ok(name.to_string());
        }

        Err(OrchestratorError::not_found("preset", name))
    }
}
