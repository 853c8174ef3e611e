use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::engine::EngineConfig;

/// Configuration loaded from `reelflow.yaml`.
/// All fields are optional; missing fields fall back to CLI/env/defaults.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ReelflowConfig {
    /// Root for run output directories when neither the workflow file nor
    /// `--output` sets one.
    pub output_root: Option<String>,
    /// Per-step deadline in seconds.
    pub step_timeout_s: Option<u64>,
    /// Default tracing filter, used when `RUST_LOG` is unset.
    pub log_level: Option<String>,
}

impl ReelflowConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `reelflow.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new("reelflow.yaml");
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        Self::from_yaml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        // An empty file deserializes to unit, not a mapping
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ReelflowConfig = serde_yml::from_str(contents)?;
        if config.step_timeout_s == Some(0) {
            anyhow::bail!("step_timeout_s must be greater than 0");
        }
        Ok(config)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(secs) = self.step_timeout_s {
            config.step_timeout = Duration::from_secs(secs);
        }
        config
    }
}
