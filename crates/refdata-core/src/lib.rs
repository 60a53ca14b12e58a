#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core types and algorithms for equity reference-data synthesis.
//!
//! This crate provides the provider-agnostic building blocks:
//!
//! - [`Symbol`](types::Symbol), [`SecurityId`](types::SecurityId) - identity types
//! - [`FactorFile`](factor::FactorFile) - cumulative price/split adjustments
//! - [`MapFile`](map::MapFile) - ticker identity history
//! - [`CoarseRow`](coarse::CoarseRow) - daily universe rows
//! - [`FilingRecord`](fundamentals::FilingRecord) and point-in-time lookups
//! - [`KeyedSingleflight`](singleflight::KeyedSingleflight) - download-once locking
//! - [`TradingCalendar`](calendar::TradingCalendar) - exchange-hours seam

/// Trading-calendar abstraction.
pub mod calendar;
/// Coarse universe row model and CSV codec.
pub mod coarse;
/// Error types for reference-data operations.
pub mod error;
/// Factor file model, CSV codec, and provider trait.
pub mod factor;
/// Quarterly filings and point-in-time fundamental lookups.
pub mod fundamentals;
/// Map file model, CSV codec, and resolver trait.
pub mod map;
/// Per-key mutual exclusion with work-elision.
pub mod singleflight;
/// Core identity types.
pub mod types;

// Re-export commonly used items at crate root
pub use calendar::{TradingCalendar, UsEquityCalendar};
pub use coarse::CoarseRow;
pub use error::{RefDataError, Result};
pub use factor::{FactorFile, FactorFileRow, FactorProvider};
pub use fundamentals::{
    FilingRecord, FundamentalField, FundamentalProperty, ReportPeriod, StatementKind, Timeframe,
};
pub use map::{MapFile, MapFileResolver, MapFileRow};
pub use singleflight::KeyedSingleflight;
pub use types::{Exchange, Market, SecurityId, SecurityType, Symbol};
