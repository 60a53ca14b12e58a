#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Polygon-backed equity reference-data provider.
//!
//! This crate materializes three kinds of derived artifacts on demand and
//! persists them as flat files the downstream backtesting engine reads:
//!
//! - [`FactorFileEngine`] - cumulative price/split adjustments per symbol
//! - [`MapFileEngine`] - ticker identity history per symbol
//! - [`UniverseEngine`] - one coarse universe CSV per trading day, with
//!   point-in-time fundamental lookups through [`Fundamentals`]
//!
//! Every engine follows the same discipline: inspect the on-disk cache,
//! and only when it is stale or absent contact the upstream under a per-key
//! singleflight lock, then write the artifact atomically.
//!
//! # Example
//!
//! ```rust,ignore
//! use refdata_polygon::{PolygonConfig, PolygonProvider};
//! use refdata_core::Symbol;
//!
//! #[tokio::main]
//! async fn main() -> refdata_core::Result<()> {
//!     let config = PolygonConfig::load()?;
//!     let provider = PolygonProvider::from_config(&config)?;
//!
//!     if let Some(factors) = provider.factor_files.get(&Symbol::equity("AAPL")).await {
//!         println!("verified through {:?}", factors.verified_through());
//!     }
//!     Ok(())
//! }
//! ```

/// REST gateway trait, resource paths, and the production client.
pub mod client;
/// Provider configuration.
pub mod config;
/// Factor-file materialization engine.
pub mod factor_files;
/// Dual-tier filing cache and fundamental valuation.
pub mod fundamentals;
/// Map-file materialization engine.
pub mod map_files;
/// Provider wiring.
pub mod provider;
/// Coarse-universe engine.
pub mod universe;

mod layout;
mod responses;

#[cfg(test)]
mod testutil;

pub use client::{PolygonRestClient, RestGateway};
pub use config::PolygonConfig;
pub use factor_files::FactorFileEngine;
pub use fundamentals::Fundamentals;
pub use map_files::{LocalDiskMapFileResolver, MapFileEngine};
pub use provider::PolygonProvider;
pub use universe::UniverseEngine;
