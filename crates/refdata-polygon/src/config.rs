//! Provider configuration.
//!
//! Settings load from an optional `polygon.toml` file overlaid with
//! `POLYGON_*` environment variables. The API key is the only required
//! value; startup fails without it, and that is the only error this crate
//! ever surfaces to callers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use refdata_core::{RefDataError, Result};

fn default_financials_cache_hours() -> u32 {
    24
}

fn default_coarse_max_concurrent() -> usize {
    10
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Configuration for the Polygon provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonConfig {
    /// Polygon API key (`polygon-api-key`). Required.
    #[serde(alias = "polygon-api-key")]
    pub api_key: String,

    /// Hours a cached filing list stays valid in live mode
    /// (`polygon-financials-cache-hours`).
    #[serde(
        default = "default_financials_cache_hours",
        alias = "polygon-financials-cache-hours"
    )]
    pub financials_cache_hours: u32,

    /// Bounded concurrency for per-ticker coarse processing
    /// (`polygon-coarse-max-concurrent`).
    #[serde(
        default = "default_coarse_max_concurrent",
        alias = "polygon-coarse-max-concurrent"
    )]
    pub coarse_max_concurrent: usize,

    /// Root directory the artifacts are written under.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Live mode ages out cached filings; batch mode (the default) trusts
    /// whatever is on disk.
    #[serde(default)]
    pub live_mode: bool,
}

impl PolygonConfig {
    /// Loads configuration from `polygon.toml` (optional) and `POLYGON_*`
    /// environment variables.
    ///
    /// # Errors
    /// Returns [`RefDataError::Config`] when the API key is missing or the
    /// sources cannot be read.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("polygon").required(false))
            .add_source(config::Environment::with_prefix("POLYGON"))
            .build()
            .map_err(|e| RefDataError::Config(e.to_string()))?;
        let cfg: Self = settings
            .try_deserialize()
            .map_err(|e| RefDataError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Creates a configuration programmatically with defaults for
    /// everything but the key and data root.
    #[must_use]
    pub fn new(api_key: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_key: api_key.into(),
            financials_cache_hours: default_financials_cache_hours(),
            coarse_max_concurrent: default_coarse_max_concurrent(),
            data_dir: data_dir.into(),
            live_mode: false,
        }
    }

    /// Checks required values.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(RefDataError::Config(
                "polygon-api-key is required".to_string(),
            ));
        }
        Ok(())
    }
}
