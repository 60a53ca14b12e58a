//! Typed decodings of Polygon REST payloads.
//!
//! The gateway hands engines raw JSON items; each engine decodes the items
//! it cares about with [`decode_items`], silently dropping anything that
//! does not match the expected shape (bad records never abort an operation).

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Decodes a batch of raw items, discarding records that fail to parse.
pub(crate) fn decode_items<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

/// One stock split from `v3/reference/splits`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SplitItem {
    #[serde(default)]
    pub execution_date: String,
    #[serde(default)]
    pub split_from: f64,
    #[serde(default)]
    pub split_to: f64,
}

/// One dividend from `v3/reference/dividends`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DividendItem {
    #[serde(default)]
    pub ex_dividend_date: String,
    #[serde(default)]
    pub cash_amount: f64,
    #[serde(default)]
    pub dividend_type: String,
}

/// One daily bar from `v2/aggs`. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AggBar {
    #[serde(rename = "t", default)]
    pub timestamp: i64,
    #[serde(rename = "c", default)]
    pub close: f64,
}

/// The `results` object of `v3/reference/tickers/{ticker}/events`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TickerEventsResult {
    #[serde(default)]
    pub events: Vec<TickerEvent>,
}

/// One ticker event.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TickerEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub ticker_change: Option<TickerChange>,
}

/// Payload of a `ticker_change` event: the ticker whose window closes the
/// day before the event's date.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TickerChange {
    #[serde(default)]
    pub ticker: String,
}

/// One listing from `v3/reference/tickers`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TickerListing {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub composite_figi: Option<String>,
}

/// One ticker entry of the full-market snapshot.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SnapshotTicker {
    #[serde(default)]
    pub ticker: String,
    #[serde(rename = "prevDay", default)]
    pub prev_day: Option<SnapshotBar>,
    #[serde(default)]
    pub day: Option<SnapshotBar>,
}

/// A snapshot bar; only close and volume are consumed.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct SnapshotBar {
    #[serde(rename = "c", default)]
    pub close: f64,
    #[serde(rename = "v", default)]
    pub volume: f64,
}

/// One filing from `vX/reference/financials`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FinancialsItem {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub filing_date: Option<String>,
    #[serde(default)]
    pub fiscal_period: String,
    #[serde(default)]
    pub fiscal_year: String,
    #[serde(default)]
    pub timeframe: String,
    #[serde(default)]
    pub financials: FinancialsPayload,
}

/// The three statement maps of one filing.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct FinancialsPayload {
    #[serde(default)]
    pub income_statement: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub balance_sheet: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub cash_flow_statement: BTreeMap<String, FieldValue>,
}

/// A reported value; Polygon wraps every figure in `{"value": ...}`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct FieldValue {
    #[serde(default)]
    pub value: Option<f64>,
}

impl FinancialsPayload {
    /// Collapses a statement map to plain field/value pairs, dropping
    /// entries without a reported value.
    pub fn collapse(map: &BTreeMap<String, FieldValue>) -> BTreeMap<String, f64> {
        map.iter()
            .filter_map(|(k, v)| v.value.map(|value| (k.clone(), value)))
            .collect()
    }
}
