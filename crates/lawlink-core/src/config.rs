//! Engine configuration, loaded from TOML.
//!
//! The fuzzy cutoff and semantic threshold are empirical values carried over
//! from the deployed matcher. They are plain configuration, not constants.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level configuration for the resolution engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub resolver: ResolverConfig,
    pub index: IndexConfig,
}

/// Tiered resolver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum fuzzy ratio accepted (inclusive).
    pub fuzzy_cutoff: f32,
    /// Cosine similarity a semantic match must exceed.
    pub semantic_threshold: f32,
    /// Number of descriptions the context aggregator keeps by default.
    pub context_top_k: usize,
    /// Concurrent resolutions within one batch.
    pub max_concurrency: usize,
    /// Budget for encoding a single reference on the semantic tier.
    pub query_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_cutoff: 0.7,
            semantic_threshold: 0.45,
            context_top_k: 3,
            max_concurrency: 8,
            query_timeout_ms: 10_000,
        }
    }
}

impl ResolverConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Embedding index build settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// A build running longer than this is recorded as failed.
    pub build_timeout_ms: u64,
    /// Texts per backend `encode_batch` call.
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            build_timeout_ms: 120_000,
            batch_size: 256,
        }
    }
}

impl IndexConfig {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.resolver;
        unit_interval("resolver.fuzzy_cutoff", r.fuzzy_cutoff)?;
        unit_interval("resolver.semantic_threshold", r.semantic_threshold)?;
        positive("resolver.max_concurrency", r.max_concurrency as u64)?;
        positive("resolver.query_timeout_ms", r.query_timeout_ms)?;
        positive("index.build_timeout_ms", self.index.build_timeout_ms)?;
        positive("index.batch_size", self.index.batch_size as u64)?;
        Ok(())
    }
}

fn unit_interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is outside [0, 1]"),
        })
    }
}

fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".into(),
        })
    }
}
