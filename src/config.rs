//! Runtime configuration
//!
//! Configuration is an explicit value handed to the dispatcher when it is
//! built. Sources, lowest precedence first: defaults, JSON, environment.
//!
//! Environment variables:
//! - `KERNJIT_WARN_ON_IMPLICIT_COPY`: warn when host arrays are staged (`1`/`0`)
//! - `KERNJIT_LOW_OCCUPANCY_WARNINGS`: warn on under-filled grids (`1`/`0`)
//! - `KERNJIT_CACHE_CAPACITY`: maximum number of cached kernels
//! - `KERNJIT_CACHE_DIR`: enable the disk cache in this directory; empty
//!   selects the platform cache directory
//! - `KERNJIT_NO_DISK_CACHE`: disable the disk cache regardless of the above

use crate::backend::default_cache_dir;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}")]
    InvalidValue { var: String, value: String },

    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Dispatch-time warning toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Warn when a host array is copied to the device for a dispatch
    pub warn_on_implicit_copy: bool,
    /// Warn when the grid has fewer than two blocks per multiprocessor
    pub low_occupancy_warnings: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            warn_on_implicit_copy: true,
            low_occupancy_warnings: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum completed entries; `None` is unbounded
    pub capacity: Option<usize>,
    /// Directory for persisted blobs; `None` disables the disk cache
    pub disk_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dispatch: DispatchConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Both dispatch warnings off
    pub fn quiet() -> Self {
        Self {
            dispatch: DispatchConfig {
                warn_on_implicit_copy: false,
                low_occupancy_warnings: false,
            },
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KERNJIT_WARN_ON_IMPLICIT_COPY") {
            self.dispatch.warn_on_implicit_copy = parse_flag("KERNJIT_WARN_ON_IMPLICIT_COPY", &v)?;
        }
        if let Some(v) = lookup("KERNJIT_LOW_OCCUPANCY_WARNINGS") {
            self.dispatch.low_occupancy_warnings =
                parse_flag("KERNJIT_LOW_OCCUPANCY_WARNINGS", &v)?;
        }
        if let Some(v) = lookup("KERNJIT_CACHE_CAPACITY") {
            let capacity = v.trim().parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                var: "KERNJIT_CACHE_CAPACITY".to_string(),
                value: v.clone(),
            })?;
            self.cache.capacity = Some(capacity);
        }
        if let Some(v) = lookup("KERNJIT_CACHE_DIR") {
            self.cache.disk_dir = if v.is_empty() {
                default_cache_dir()
            } else {
                Some(PathBuf::from(v))
            };
        }
        if lookup("KERNJIT_NO_DISK_CACHE").is_some() {
            self.cache.disk_dir = None;
        }
        Ok(self)
    }
}

fn parse_flag(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}
