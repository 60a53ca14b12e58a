//! Factor files: cumulative price and split adjustment series.
//!
//! A factor file is an ordered sequence of rows, one per corporate action,
//! expressing the cumulative adjustment that converts a raw price on the
//! row's date into a price in the top-sentinel ("as of today") basis:
//!
//! - the **earliest sentinel** row anchors the series at the first available
//!   trading day with factors `(1, 1)` and reference price `0`;
//! - the **top sentinel** row marks the date the file was last verified, and
//!   always carries factors `(1, 1)`.
//!
//! Rows are strictly ascending by date. The on-disk format is headerless
//! CSV, one row per line: `YYYYMMDD,priceFactor,splitFactor,referencePrice`,
//! with shortest-roundtrip decimal formatting (no trailing zeros).

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use crate::error::{RefDataError, Result};
use crate::types::Symbol;

/// Date of the earliest sentinel row: the first day of upstream history.
#[must_use]
pub fn earliest_sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid calendar date")
}

/// One row of a factor file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FactorFileRow {
    /// Last date (inclusive) this row's factors apply to.
    pub date: NaiveDate,
    /// Cumulative dividend adjustment into the top-sentinel basis.
    pub price_factor: f64,
    /// Cumulative split adjustment into the top-sentinel basis.
    pub split_factor: f64,
    /// Raw close used to compute the factor, `0` for sentinel rows.
    pub reference_price: f64,
}

impl FactorFileRow {
    /// Creates a sentinel row with unit factors and no reference price.
    #[must_use]
    pub const fn sentinel(date: NaiveDate) -> Self {
        Self {
            date,
            price_factor: 1.0,
            split_factor: 1.0,
            reference_price: 0.0,
        }
    }

    /// Serializes the row as one CSV line (no trailing newline).
    #[must_use]
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{}",
            self.date.format("%Y%m%d"),
            self.price_factor,
            self.split_factor,
            self.reference_price
        )
    }

    /// Parses a row from one CSV line.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut parts = line.trim().split(',');
        let date = parts
            .next()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok())
            .ok_or_else(|| RefDataError::Parse(format!("bad factor row date: {line}")))?;
        let mut field = |name: &str| -> Result<f64> {
            parts
                .next()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| RefDataError::Parse(format!("bad factor row {name}: {line}")))
        };
        Ok(Self {
            date,
            price_factor: field("price factor")?,
            split_factor: field("split factor")?,
            reference_price: field("reference price")?,
        })
    }
}

/// A full factor file for one symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct FactorFile {
    ticker: String,
    rows: Vec<FactorFileRow>,
}

impl FactorFile {
    /// Creates a factor file from rows sorted strictly ascending by date.
    #[must_use]
    pub fn new(ticker: impl Into<String>, rows: Vec<FactorFileRow>) -> Self {
        Self {
            ticker: ticker.into().to_uppercase(),
            rows,
        }
    }

    /// The minimal factor file: earliest sentinel plus a top sentinel at
    /// `verified_through`. Emitted when a symbol has no corporate actions.
    #[must_use]
    pub fn minimal(ticker: impl Into<String>, verified_through: NaiveDate) -> Self {
        Self::new(
            ticker,
            vec![
                FactorFileRow::sentinel(earliest_sentinel_date()),
                FactorFileRow::sentinel(verified_through),
            ],
        )
    }

    /// Returns the uppercase ticker this file belongs to.
    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Returns the rows in ascending date order.
    #[must_use]
    pub fn rows(&self) -> &[FactorFileRow] {
        &self.rows
    }

    /// Returns the top sentinel's date: the date the file was verified
    /// through.
    #[must_use]
    pub fn verified_through(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }

    /// A file is fresh when its top sentinel is no older than yesterday.
    #[must_use]
    pub fn is_fresh(&self, today: NaiveDate) -> bool {
        self.verified_through()
            .is_some_and(|d| d >= today - Duration::days(1))
    }

    /// Returns a copy with the top sentinel's date moved to `date`, factors
    /// and reference price unchanged. Used by incremental refresh when no new
    /// corporate actions exist.
    #[must_use]
    pub fn with_verified_through(&self, date: NaiveDate) -> Self {
        let mut rows = self.rows.clone();
        if let Some(last) = rows.last_mut() {
            last.date = date;
        }
        Self::new(self.ticker.clone(), rows)
    }

    /// Returns `(price_factor, split_factor)` valid for trades on `date`.
    ///
    /// The factors come from the first row whose date is on or after `date`;
    /// dates beyond the top sentinel scale by `(1, 1)`.
    #[must_use]
    pub fn factors_on(&self, date: NaiveDate) -> (f64, f64) {
        self.rows
            .iter()
            .find(|r| r.date >= date)
            .map_or((1.0, 1.0), |r| (r.price_factor, r.split_factor))
    }

    /// Serializes the file to its on-disk CSV form.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            out.push_str(&row.to_csv_line());
            out.push('\n');
        }
        out
    }

    /// Parses a factor file from its on-disk CSV form.
    pub fn parse(ticker: impl Into<String>, contents: &str) -> Result<Self> {
        let rows = contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(FactorFileRow::parse_line)
            .collect::<Result<Vec<_>>>()?;
        if rows.is_empty() {
            return Err(RefDataError::Parse("empty factor file".to_string()));
        }
        Ok(Self::new(ticker, rows))
    }
}

/// Source of factor files for downstream consumers.
///
/// The coarse-universe engine consults this to scale each day's close and
/// volume; failures degrade to unit factors, so the trait returns an
/// `Option` rather than an error.
#[async_trait]
pub trait FactorProvider: Send + Sync {
    /// Returns the factor file for `symbol`, or `None` when the symbol is
    /// not serviced or generation failed.
    async fn factor_file(&self, symbol: &Symbol) -> Option<FactorFile>;
}
