//! On-demand factor-file materialization.
//!
//! One factor file per equity symbol, generated from the symbol's split and
//! dividend history and refreshed incrementally: a file whose top sentinel
//! is current is served straight from disk; a stale file only triggers a
//! rebuild when new corporate actions actually exist, otherwise its
//! verification date is advanced in place.
//!
//! All upstream work happens under a per-symbol singleflight lock, so
//! concurrent demand for the same symbol costs one fetch sequence and one
//! file write.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use refdata_core::factor::earliest_sentinel_date;
use refdata_core::{
    FactorFile, FactorFileRow, FactorProvider, KeyedSingleflight, Result, Symbol, TradingCalendar,
};

use crate::client::{aggregates_resource, RestGateway, DIVIDENDS_RESOURCE, SPLITS_RESOURCE};
use crate::layout::{write_atomic, DataLayout};
use crate::responses::{decode_items, AggBar, DividendItem, SplitItem};

/// Dividend types that adjust prices: cash and special cash.
const CASH_DIVIDEND_TYPES: [&str; 2] = ["CD", "SC"];

/// How many calendar days before an event a reference close may sit.
const REFERENCE_LOOKBACK_DAYS: i64 = 5;

/// A split or dividend with its resolved reference price.
#[derive(Clone, Copy, Debug)]
struct CorporateAction {
    /// Event date (execution date or ex-dividend date).
    date: NaiveDate,
    /// Trading day the factor row is written at.
    row_date: NaiveDate,
    /// Raw close on `row_date`.
    reference_price: f64,
    kind: ActionKind,
}

#[derive(Clone, Copy, Debug)]
enum ActionKind {
    /// Factor is `old_shares / new_shares`.
    Split { factor: f64 },
    Dividend { cash: f64 },
}

impl ActionKind {
    /// Splits apply before dividends sharing the same event date.
    const fn order(&self) -> u8 {
        match self {
            Self::Split { .. } => 0,
            Self::Dividend { .. } => 1,
        }
    }
}

/// Materializes and incrementally refreshes factor files.
pub struct FactorFileEngine {
    gateway: Arc<dyn RestGateway>,
    calendar: Arc<dyn TradingCalendar>,
    layout: DataLayout,
    locks: KeyedSingleflight,
}

impl FactorFileEngine {
    /// Creates an engine writing under `data_dir`.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn RestGateway>,
        calendar: Arc<dyn TradingCalendar>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            calendar,
            layout: DataLayout::new(data_dir),
            locks: KeyedSingleflight::new(),
        }
    }

    /// Returns the factor file for `symbol`, materializing or refreshing it
    /// as needed. Non-equity symbols yield `None`; upstream failures degrade
    /// to a minimal, uncached file.
    pub async fn get(&self, symbol: &Symbol) -> Option<FactorFile> {
        if !symbol.is_equity() {
            return None;
        }
        let ticker = symbol.ticker();
        let path = self.layout.factor_file(ticker);
        let today = Utc::now().date_naive();

        if let Some(file) = self.read_existing(&path, ticker).await {
            if file.is_fresh(today) {
                return Some(file);
            }
        }

        self.locks
            .execute(ticker, false, || async move {
                match self.read_existing(&path, ticker).await {
                    Some(file) if file.is_fresh(today) => Some(file),
                    Some(file) => self.refresh(ticker, file, today, &path).await,
                    None => self.generate(ticker, today, &path).await,
                }
            })
            .await
            .flatten()
    }

    /// Reads and parses the on-disk file, deleting it when corrupt.
    async fn read_existing(&self, path: &Path, ticker: &str) -> Option<FactorFile> {
        let contents = tokio::fs::read_to_string(path).await.ok()?;
        match FactorFile::parse(ticker, &contents) {
            Ok(file) => Some(file),
            Err(err) => {
                warn!(ticker, %err, "discarding corrupt factor file");
                let _ = tokio::fs::remove_file(path).await;
                None
            }
        }
    }

    /// Incremental refresh: when no corporate actions occurred since the top
    /// sentinel, only the verification date moves; otherwise the whole file
    /// is rebuilt.
    async fn refresh(
        &self,
        ticker: &str,
        existing: FactorFile,
        today: NaiveDate,
        path: &Path,
    ) -> Option<FactorFile> {
        let since = existing.verified_through()? + Duration::days(1);
        let fetched = tokio::try_join!(
            self.fetch_splits(ticker, since, today),
            self.fetch_dividends(ticker, since, today)
        );
        let (splits, dividends) = match fetched {
            Ok(pair) => pair,
            Err(err) => {
                warn!(ticker, %err, "refresh fetch failed; keeping previous factor file");
                return Some(existing);
            }
        };

        if splits.is_empty() && dividends.is_empty() {
            let updated = existing.with_verified_through(today);
            if let Err(err) = write_atomic(path, &updated.to_csv()).await {
                warn!(ticker, %err, "failed to persist refreshed factor file");
                return Some(existing);
            }
            debug!(ticker, %today, "factor file verification date advanced");
            return Some(updated);
        }

        self.generate(ticker, today, path).await
    }

    /// Full generation. Upstream failures degrade to an uncached minimal
    /// file so the next request can retry.
    async fn generate(&self, ticker: &str, today: NaiveDate, path: &Path) -> Option<FactorFile> {
        let file = match self.build(ticker, today).await {
            Ok(file) => file,
            Err(err) => {
                warn!(ticker, %err, "factor generation failed; degrading to minimal file");
                return Some(FactorFile::minimal(ticker, today));
            }
        };
        if let Err(err) = write_atomic(path, &file.to_csv()).await {
            warn!(ticker, %err, "failed to persist factor file");
        }
        Some(file)
    }

    async fn build(&self, ticker: &str, today: NaiveDate) -> Result<FactorFile> {
        let start = earliest_sentinel_date();
        let splits = self.fetch_splits(ticker, start, today).await?;
        let dividends = self.fetch_dividends(ticker, start, today).await?;
        if splits.is_empty() && dividends.is_empty() {
            return Ok(FactorFile::minimal(ticker, today));
        }

        let closes = self.fetch_daily_closes(ticker, start, today).await?;
        if closes.is_empty() {
            warn!(ticker, "no unadjusted daily closes; emitting minimal factor file");
            return Ok(FactorFile::minimal(ticker, today));
        }

        let actions = self.resolve_actions(&splits, &dividends, &closes);
        Ok(apply_actions(ticker, today, &closes, &actions))
    }

    async fn fetch_splits(
        &self,
        ticker: &str,
        gte: NaiveDate,
        lte: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64, f64)>> {
        let gte = gte.to_string();
        let lte = lte.to_string();
        let params = [
            ("ticker", ticker),
            ("execution_date.gte", gte.as_str()),
            ("execution_date.lte", lte.as_str()),
            ("order", "asc"),
            ("limit", "1000"),
        ];
        let items = self.gateway.fetch_pages(SPLITS_RESOURCE, &params).await?;
        let mut splits: Vec<(NaiveDate, f64, f64)> = decode_items::<SplitItem>(items)
            .into_iter()
            .filter_map(|s| {
                let date = parse_iso_date(&s.execution_date)?;
                Some((date, s.split_from, s.split_to))
            })
            .collect();
        splits.sort_by_key(|(date, ..)| *date);
        splits.dedup_by_key(|(date, ..)| *date);
        Ok(splits)
    }

    async fn fetch_dividends(
        &self,
        ticker: &str,
        gte: NaiveDate,
        lte: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>> {
        let gte = gte.to_string();
        let lte = lte.to_string();
        let params = [
            ("ticker", ticker),
            ("ex_dividend_date.gte", gte.as_str()),
            ("ex_dividend_date.lte", lte.as_str()),
            ("order", "asc"),
            ("limit", "1000"),
        ];
        let items = self.gateway.fetch_pages(DIVIDENDS_RESOURCE, &params).await?;
        let mut dividends: Vec<(NaiveDate, f64)> = decode_items::<DividendItem>(items)
            .into_iter()
            .filter(|d| CASH_DIVIDEND_TYPES.contains(&d.dividend_type.as_str()))
            .filter_map(|d| {
                let date = parse_iso_date(&d.ex_dividend_date)?;
                Some((date, d.cash_amount))
            })
            .collect();
        dividends.sort_by_key(|(date, _)| *date);
        dividends.dedup_by_key(|(date, _)| *date);
        Ok(dividends)
    }

    /// Fetches unadjusted daily closes keyed by date.
    async fn fetch_daily_closes(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, f64>> {
        let resource = aggregates_resource(ticker, from, to);
        let params = [("adjusted", "false"), ("sort", "desc")];
        let items = self.gateway.fetch_pages(&resource, &params).await?;
        let closes = decode_items::<AggBar>(items)
            .into_iter()
            .filter_map(|bar| {
                let date = DateTime::from_timestamp_millis(bar.timestamp)?.date_naive();
                Some((date, bar.close))
            })
            .collect();
        Ok(closes)
    }

    /// Resolves each raw event against the close series, dropping events
    /// with no usable reference price or degenerate terms.
    fn resolve_actions(
        &self,
        splits: &[(NaiveDate, f64, f64)],
        dividends: &[(NaiveDate, f64)],
        closes: &BTreeMap<NaiveDate, f64>,
    ) -> Vec<CorporateAction> {
        let mut actions = Vec::new();

        for &(date, from, to) in splits {
            if to == 0.0 || from == 0.0 {
                continue;
            }
            let Some((row_date, reference_price)) = self.reference_close(closes, date) else {
                continue;
            };
            actions.push(CorporateAction {
                date,
                row_date,
                reference_price,
                kind: ActionKind::Split { factor: from / to },
            });
        }

        for &(date, cash) in dividends {
            if cash <= 0.0 {
                continue;
            }
            let Some((row_date, reference_price)) = self.reference_close(closes, date) else {
                continue;
            };
            actions.push(CorporateAction {
                date,
                row_date,
                reference_price,
                kind: ActionKind::Dividend { cash },
            });
        }

        actions.sort_by_key(|a| (a.date, a.kind.order()));
        actions
    }

    /// The close on the most recent trading day strictly inside
    /// `[event - 5d, event - 1d]`, walked back through the calendar.
    fn reference_close(
        &self,
        closes: &BTreeMap<NaiveDate, f64>,
        event: NaiveDate,
    ) -> Option<(NaiveDate, f64)> {
        let floor = event - Duration::days(REFERENCE_LOOKBACK_DAYS);
        let mut day = self.calendar.previous_trading_day(event);
        while day >= floor {
            if let Some(&close) = closes.get(&day) {
                return (close > 0.0).then_some((day, close));
            }
            day = self.calendar.previous_trading_day(day);
        }
        None
    }
}

#[async_trait]
impl FactorProvider for FactorFileEngine {
    async fn factor_file(&self, symbol: &Symbol) -> Option<FactorFile> {
        self.get(symbol).await
    }
}

fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Folds sorted corporate actions into a factor file.
///
/// Rows accumulate the adjustment that converts a raw price on the row's
/// date into the top-sentinel basis: each action scales every earlier row
/// and contributes its own row at the event's previous trading day, while
/// the top sentinel stays at unit factors.
fn apply_actions(
    ticker: &str,
    today: NaiveDate,
    closes: &BTreeMap<NaiveDate, f64>,
    actions: &[CorporateAction],
) -> FactorFile {
    let earliest = closes
        .keys()
        .next()
        .copied()
        .unwrap_or_else(earliest_sentinel_date);
    let mut rows = vec![
        FactorFileRow::sentinel(earliest),
        FactorFileRow::sentinel(today),
    ];

    for action in actions {
        let (price_mult, split_mult) = match action.kind {
            ActionKind::Split { factor } => (1.0, factor),
            ActionKind::Dividend { cash } => {
                ((action.reference_price - cash) / action.reference_price, 1.0)
            }
        };

        for row in rows.iter_mut().filter(|r| r.date < action.date) {
            row.price_factor *= price_mult;
            row.split_factor *= split_mult;
        }

        match rows.binary_search_by_key(&action.row_date, |r| r.date) {
            // Same row date as an earlier action: the scaling pass above
            // already carries the combined factors, only the reference
            // price is rewritten.
            Ok(idx) => rows[idx].reference_price = action.reference_price,
            Err(idx) => rows.insert(
                idx,
                FactorFileRow {
                    date: action.row_date,
                    price_factor: price_mult,
                    split_factor: split_mult,
                    reference_price: action.reference_price,
                },
            ),
        }
    }

    FactorFile::new(ticker, rows)
}
