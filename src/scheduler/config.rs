//! Engine configuration
//!
//! Every field has a default, so `{}` is a complete configuration.

use std::num::NonZeroUsize;
use std::thread;

use serde::{Deserialize, Serialize};

use super::errors::ConfigError;
use crate::observability::Severity;

/// Which already-valid transactions a publication sends back to validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevalidationPolicy {
    /// Only readers registered on a key (or range) the publication changed.
    #[default]
    Targeted,
    /// Every valid index above the publisher.
    Eager,
}

/// Block executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on worker threads (default: available parallelism)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Lock shards of the multi-version store (default: 16)
    #[serde(default = "default_shards")]
    pub version_shards: usize,

    /// Lock shards of the commit cache (default: 16)
    #[serde(default = "default_shards")]
    pub cache_shards: usize,

    /// Total commit cache entries (default: 65536)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Cascading re-validation strategy (default: targeted)
    #[serde(default)]
    pub revalidation: RevalidationPolicy,

    /// Process-wide minimum logged severity, applied by
    /// `BlockExecutor::new`. The logger level is global: every engine in the
    /// process shares it, and the last one built with `Some` wins. `None`
    /// (default) leaves the current level alone.
    #[serde(default)]
    pub log_level: Option<Severity>,
}

fn default_concurrency() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn default_shards() -> usize {
    16
}

fn default_cache_capacity() -> usize {
    65_536
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            version_shards: default_shards(),
            cache_shards: default_shards(),
            cache_capacity: default_cache_capacity(),
            revalidation: RevalidationPolicy::default(),
            log_level: None,
        }
    }
}

impl EngineConfig {
    /// Default config with a fixed worker bound
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("concurrency", self.concurrency),
            ("version_shards", self.version_shards),
            ("cache_shards", self.cache_shards),
            ("cache_capacity", self.cache_capacity),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}
