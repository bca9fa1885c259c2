//! Serializable run configuration.
//!
//! One `AggregatorConfig` is built at startup (defaults, or a TOML file) and
//! passed by reference to every component of a run.

use issuerlab_core::codec::FloatParsing;
use issuerlab_core::data::{SelectorConfig, SelectorError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid config: {0}")]
    Selectors(#[from] SelectorError),
}

/// What the table builder does when one entity fails to extract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityFailurePolicy {
    /// Fail the whole table with the entity's error.
    #[default]
    FailTable,
    /// Log the failure, leave the entity out and keep the rest.
    SkipEntity,
}

/// Configuration for an aggregation run.
///
/// ```toml
/// base_url = "https://www.mse.mk"
/// fetch_timeout_ms = 5000
/// concurrency = 1
/// entity_limit = 10
/// entity_failure = "skip_entity"
///
/// [selectors]
/// ticker = "#symbols > li:nth-child(1) > a:nth-child(1)"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Site every document path is resolved against.
    pub base_url: String,
    /// Path of the listing page that enumerates entities.
    pub listing_path: String,
    /// Per-request timeout in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Maximum entity fetches in flight per table. The upstream site's
    /// tolerance is unknown, so this defaults to serial.
    pub concurrency: usize,
    /// Process only the first N listing entries.
    pub entity_limit: Option<usize>,
    pub entity_failure: EntityFailurePolicy,
    /// FLOAT cleaning used when exporting decoded values.
    pub float_parsing: FloatParsing,
    pub selectors: SelectorConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.mse.mk".into(),
            listing_path: "/en/issuers/shares-listing".into(),
            fetch_timeout_ms: 5000,
            concurrency: 1,
            entity_limit: None,
            entity_failure: EntityFailurePolicy::FailTable,
            float_parsing: FloatParsing::Separators,
            selectors: SelectorConfig::default(),
        }
    }
}

impl AggregatorConfig {
    /// Load and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.listing_path.trim().is_empty() {
            return Err(ConfigError::Invalid("listing_path is empty".into()));
        }
        Ok(self.selectors.validate()?)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
