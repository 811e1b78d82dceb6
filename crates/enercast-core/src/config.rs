//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! [cache]
//! capacity = 16
//!
//! [forecast]
//! imputation = "forward_fill"
//! max_gap_fraction = 0.2
//!
//! [backtest]
//! max_concurrent_steps = 4
//! retained_jobs = 32
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ValidationError;

/// Failure to read or accept a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub cache: ModelCacheConfig,
    pub forecast: ForecastConfig,
    pub backtest: BacktestConfig,
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cache.capacity == 0 {
            return Err(invalid("cache.capacity must be at least 1"));
        }
        let fraction = self.forecast.max_gap_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(invalid(format!(
                "forecast.max_gap_fraction {fraction} must be within [0, 1]"
            )));
        }
        if self.backtest.max_concurrent_steps == 0 {
            return Err(invalid("backtest.max_concurrent_steps must be at least 1"));
        }
        if self.backtest.retained_jobs == 0 {
            return Err(invalid("backtest.retained_jobs must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        reason: reason.into(),
    }
}

/// Resident model capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelCacheConfig {
    pub capacity: usize,
}

impl Default for ModelCacheConfig {
    fn default() -> Self {
        Self { capacity: 16 }
    }
}

/// How gaps inside a lookback window are filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationPolicy {
    /// Carry the previous observation forward.
    #[default]
    ForwardFill,
    /// Interpolate linearly between the surrounding observations.
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    pub imputation: ImputationPolicy,
    /// Largest share of the lookback window that may be imputed.
    pub max_gap_fraction: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            imputation: ImputationPolicy::ForwardFill,
            max_gap_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BacktestConfig {
    pub max_concurrent_steps: usize,
    /// Settled background jobs kept for status queries; older ones are dropped.
    pub retained_jobs: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_steps: 4,
            retained_jobs: 32,
        }
    }
}
