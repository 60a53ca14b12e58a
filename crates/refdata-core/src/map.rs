//! Map files: ticker-symbol identity history for a permanent security.
//!
//! A map file is an ordered sequence of `(date, ticker, exchange)` rows. Row
//! *i* means "from the previous row's date + 1 (or the earliest sentinel for
//! the first row) through `date` inclusive, the security traded under
//! `ticker`". The final row is either the delisting date, or a far-future
//! sentinel (2050-12-31) for still-active securities.
//!
//! On-disk format is headerless CSV: `YYYYMMDD,TICKER,CODE`.

use chrono::{Duration, NaiveDate};

use crate::error::{RefDataError, Result};
use crate::factor::earliest_sentinel_date;
use crate::types::Exchange;

/// Sentinel date marking a still-listed security.
#[must_use]
pub fn far_future_sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2050, 12, 31).expect("valid calendar date")
}

/// One row of a map file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapFileRow {
    /// Last date (inclusive) the security traded under `ticker`.
    pub date: NaiveDate,
    /// Uppercase ticker in effect through `date`.
    pub ticker: String,
    /// Primary exchange.
    pub exchange: Exchange,
}

impl MapFileRow {
    /// Creates a row, uppercasing the ticker.
    #[must_use]
    pub fn new(date: NaiveDate, ticker: impl Into<String>, exchange: Exchange) -> Self {
        Self {
            date,
            ticker: ticker.into().to_uppercase(),
            exchange,
        }
    }

    /// Serializes the row as one CSV line (no trailing newline).
    #[must_use]
    pub fn to_csv_line(&self) -> String {
        format!("{},{},{}", self.date.format("%Y%m%d"), self.ticker, self.exchange.code())
    }

    /// Parses a row from one CSV line.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut parts = line.trim().split(',');
        let date = parts
            .next()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok())
            .ok_or_else(|| RefDataError::Parse(format!("bad map row date: {line}")))?;
        let ticker = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RefDataError::Parse(format!("bad map row ticker: {line}")))?;
        let exchange = parts
            .next()
            .map_or(Exchange::Unknown, Exchange::from_code);
        Ok(Self::new(date, ticker, exchange))
    }
}

/// A full map file for one permanent security identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapFile {
    ticker: String,
    rows: Vec<MapFileRow>,
}

impl MapFile {
    /// Creates a map file from rows sorted strictly ascending by date.
    #[must_use]
    pub fn new(ticker: impl Into<String>, rows: Vec<MapFileRow>) -> Self {
        Self {
            ticker: ticker.into().to_uppercase(),
            rows,
        }
    }

    /// The minimal map file: the requested ticker from the earliest sentinel
    /// through the far-future sentinel. Emitted when the upstream cannot be
    /// reached.
    #[must_use]
    pub fn minimal(ticker: impl Into<String>, exchange: Exchange) -> Self {
        let ticker = ticker.into();
        Self::new(
            ticker.clone(),
            vec![
                MapFileRow::new(earliest_sentinel_date(), ticker.clone(), exchange),
                MapFileRow::new(far_future_sentinel_date(), ticker, exchange),
            ],
        )
    }

    /// Returns the uppercase ticker this file was requested for.
    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Returns the rows in ascending date order.
    #[must_use]
    pub fn rows(&self) -> &[MapFileRow] {
        &self.rows
    }

    /// Returns true when the file has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A file is fresh when its last row is no older than yesterday, or sits
    /// within a year of the far-future sentinel (still-listed securities).
    #[must_use]
    pub fn is_fresh(&self, today: NaiveDate) -> bool {
        self.rows.last().is_some_and(|r| {
            r.date >= today - Duration::days(1)
                || r.date >= far_future_sentinel_date() - Duration::days(365)
        })
    }

    /// Returns the ticker the security traded under on `date`, if mapped.
    #[must_use]
    pub fn ticker_on(&self, date: NaiveDate) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.date >= date)
            .map(|r| r.ticker.as_str())
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

    /// Parses a map file from its on-disk CSV form.
    pub fn parse(ticker: impl Into<String>, contents: &str) -> Result<Self> {
        let rows = contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(MapFileRow::parse_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(ticker, rows))
    }
}

/// Resolver over map files already materialized on local disk.
///
/// Consulted before any upstream work; the engine only synthesizes a fresh
/// file when the resolver comes back empty.
pub trait MapFileResolver: Send + Sync {
    /// Returns the on-disk map file covering `ticker` on `date`, if any.
    fn resolve(&self, ticker: &str, date: NaiveDate) -> Option<MapFile>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn renamed() -> MapFile {
        MapFile::new(
            "NEW",
            vec![
                MapFileRow::new(earliest_sentinel_date(), "NEW", Exchange::Nasdaq),
                MapFileRow::new(date(2019, 4, 30), "OLD", Exchange::Nasdaq),
                MapFileRow::new(far_future_sentinel_date(), "NEW", Exchange::Nasdaq),
            ],
        )
    }

    #[test]
    fn csv_round_trip() {
        let file = renamed();
        let csv = file.to_csv();
        assert!(csv.starts_with("20000101,NEW,Q\n"));
        let reparsed = MapFile::parse("NEW", &csv).unwrap();
        assert_eq!(reparsed, file);
    }

    #[test]
    fn ticker_on_respects_windows() {
        let file = renamed();
        assert_eq!(file.ticker_on(date(2018, 6, 1)), Some("OLD"));
        assert_eq!(file.ticker_on(date(2019, 4, 30)), Some("OLD"));
        assert_eq!(file.ticker_on(date(2019, 5, 1)), Some("NEW"));
        assert_eq!(file.ticker_on(date(2051, 1, 1)), None);
    }

    #[test]
    fn far_future_sentinel_keeps_file_fresh() {
        let file = renamed();
        assert!(file.is_fresh(date(2026, 8, 1)));
    }

    #[test]
    fn delisted_file_goes_stale() {
        let file = MapFile::new(
            "GONE",
            vec![
                MapFileRow::new(earliest_sentinel_date(), "GONE", Exchange::Nasdaq),
                MapFileRow::new(date(2021, 3, 15), "GONE", Exchange::Nasdaq),
            ],
        );
        assert!(file.is_fresh(date(2021, 3, 16)));
        assert!(!file.is_fresh(date(2021, 6, 1)));
    }

    #[test]
    fn minimal_file_brackets_requested_ticker() {
        let file = MapFile::minimal("xyz", Exchange::Nasdaq);
        assert_eq!(file.rows().len(), 2);
        assert_eq!(file.rows()[0].ticker, "XYZ");
        assert_eq!(file.rows()[1].date, far_future_sentinel_date());
    }

    #[test]
    fn rows_parse_uppercase() {
        let row = MapFileRow::parse_line("20210315,gone,Q").unwrap();
        assert_eq!(row.ticker, "GONE");
        assert_eq!(row.exchange, Exchange::Nasdaq);
    }
}
