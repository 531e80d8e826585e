//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - rulescope.toml (project configuration)
//! - Environment variables (RULESCOPE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # rulescope.toml
//! [analysis]
//! tuple_cutoff = 5
//! exploder_threshold = 2
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RULESCOPE_ANALYSIS__TUPLE_CUTOFF=8
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Knobs of the analyses and transformation passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum tuple-set row count after each prune.
    #[serde(default = "default_tuple_cutoff")]
    pub tuple_cutoff: usize,

    /// Tuple-set cutoff of the rule exploder; values above one also
    /// enable common-tail factoring.
    #[serde(default = "default_exploder_threshold")]
    pub exploder_threshold: usize,
}

fn default_tuple_cutoff() -> usize {
    5
}

fn default_exploder_threshold() -> usize {
    1
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            tuple_cutoff: default_tuple_cutoff(),
            exploder_threshold: default_exploder_threshold(),
        }
    }
}

impl Config {
    /// Load from `rulescope.toml` (if present) with `RULESCOPE_*`
    /// environment overrides on top.
    pub fn load() -> Result<Config, ConfigError> {
        Config::load_from(Path::new("rulescope.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RULESCOPE_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.tuple_cutoff == 0 {
            return Err(ConfigError::Invalid(
                "analysis.tuple_cutoff must be positive".to_string(),
            ));
        }
        if self.analysis.exploder_threshold == 0 {
            return Err(ConfigError::Invalid(
                "analysis.exploder_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
