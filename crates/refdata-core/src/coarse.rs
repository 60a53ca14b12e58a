//! Coarse universe rows: one line per active US equity per trading day.
//!
//! On-disk format is headerless CSV sorted by the stringified permanent
//! identifier:
//!
//! `permId,TICKER,close,volume,dollarVolume,hasFundamentalData,priceFactor,splitFactor`

use crate::error::{RefDataError, Result};
use crate::types::SecurityId;

/// One row of a coarse universe file.
#[derive(Clone, Debug, PartialEq)]
pub struct CoarseRow {
    /// Stable permanent identifier, the row's sort key.
    pub security_id: SecurityId,
    /// Uppercase ticker on the file's date.
    pub ticker: String,
    /// Unadjusted close.
    pub close: f64,
    /// Share volume.
    pub volume: u64,
    /// `trunc(close * volume)`.
    pub dollar_volume: u64,
    /// Whether fundamental data exists for the security.
    pub has_fundamentals: bool,
    /// Price factor valid on the file's date.
    pub price_factor: f64,
    /// Split factor valid on the file's date.
    pub split_factor: f64,
}

impl CoarseRow {
    /// Computes the dollar volume for a close/volume pair.
    #[must_use]
    pub fn dollar_volume_for(close: f64, volume: u64) -> u64 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let dv = (close * volume as f64).trunc() as u64;
        dv
    }

    /// Serializes the row as one CSV line (no trailing newline).
    #[must_use]
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.security_id,
            self.ticker,
            self.close,
            self.volume,
            self.dollar_volume,
            self.has_fundamentals,
            self.price_factor,
            self.split_factor
        )
    }

    /// Parses a row from one CSV line.
    pub fn parse_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.trim().split(',').collect();
        if parts.len() != 8 {
            return Err(RefDataError::Parse(format!("bad coarse row: {line}")));
        }
        let num = |idx: usize, name: &str| -> Result<f64> {
            parts[idx]
                .parse::<f64>()
                .map_err(|_| RefDataError::Parse(format!("bad coarse {name}: {line}")))
        };
        let int = |idx: usize, name: &str| -> Result<u64> {
            parts[idx]
                .parse::<u64>()
                .map_err(|_| RefDataError::Parse(format!("bad coarse {name}: {line}")))
        };
        Ok(Self {
            security_id: SecurityId::new(parts[0]),
            ticker: parts[1].to_uppercase(),
            close: num(2, "close")?,
            volume: int(3, "volume")?,
            dollar_volume: int(4, "dollar volume")?,
            has_fundamentals: parts[5] == "true",
            price_factor: num(6, "price factor")?,
            split_factor: num(7, "split factor")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_round_trip() {
        let row = CoarseRow {
            security_id: SecurityId::new("BBG000B9XRY4"),
            ticker: "AAPL".to_string(),
            close: 227.52,
            volume: 54_146_023,
            dollar_volume: CoarseRow::dollar_volume_for(227.52, 54_146_023),
            has_fundamentals: false,
            price_factor: 1.0,
            split_factor: 1.0,
        };
        let line = row.to_csv_line();
        assert_eq!(CoarseRow::parse_line(&line).unwrap(), row);
    }

    #[test]
    fn dollar_volume_truncates() {
        assert_eq!(CoarseRow::dollar_volume_for(10.5, 3), 31);
        assert_eq!(CoarseRow::dollar_volume_for(0.999, 1000), 999);
    }

    #[test]
    fn parse_rejects_short_lines() {
        assert!(CoarseRow::parse_line("a,b,c").is_err());
    }
}
