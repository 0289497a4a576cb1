//! Runtime configuration for the `docflow` binary.
//!
//! Config is an optional JSON file; every field has a default so an empty
//! object is a valid config. CLI flags are applied on top by the caller.
use crate::pool::DEFAULT_MAX_CONCURRENCY;
use crate::render::OutputFormat;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const CONFIG_ENV_VAR: &str = "DOCFLOW_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Let text outputs replace populated files instead of preserving them.
    #[serde(default)]
    pub overwrite_text_outputs: bool,
    #[serde(default = "default_report_format")]
    pub report_format: OutputFormat,
}

fn default_schema_version() -> u32 {
    CONFIG_SCHEMA_VERSION
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_report_format() -> OutputFormat {
    OutputFormat::Markdown
}

impl Default for FlowConfig {
    fn default() -> Self {
        default_config()
    }
}

pub fn default_config() -> FlowConfig {
    FlowConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        max_concurrency: DEFAULT_MAX_CONCURRENCY,
        overwrite_text_outputs: false,
        report_format: default_report_format(),
    }
}

pub fn load_config(path: &Path) -> Result<FlowConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: FlowConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &FlowConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if !config.report_format.supports_report() {
        return Err(anyhow!(
            "report_format must be \"markdown\" or \"json\" (got {:?})",
            config.report_format.as_str()
        ));
    }
    Ok(())
}

/// Pick the config file: an explicit path wins over the environment.
pub fn config_source(explicit: Option<&Path>, env_value: Option<String>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    env_value
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

/// Load the effective config, falling back to defaults when none is named.
pub fn resolve_config(explicit: Option<&Path>) -> Result<FlowConfig> {
    match config_source(explicit, std::env::var(CONFIG_ENV_VAR).ok()) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            load_config(&path)
        }
        None => Ok(default_config()),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
