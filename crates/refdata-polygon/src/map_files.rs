//! On-demand map-file materialization.
//!
//! Map files come from the upstream ticker-event history (renames and
//! delistings). A local on-disk resolver is consulted first; upstream work
//! only happens when no usable file exists, under a per-symbol singleflight
//! lock. When the upstream cannot be reached the engine serves a minimal
//! two-row file without caching it, so the next request retries.

use chrono::{Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use refdata_core::factor::earliest_sentinel_date;
use refdata_core::map::far_future_sentinel_date;
use refdata_core::{Exchange, MapFile, MapFileResolver, MapFileRow, KeyedSingleflight, Symbol};

use crate::client::{ticker_events_resource, RestGateway};
use crate::layout::{write_atomic, DataLayout};
use crate::responses::{decode_items, TickerEventsResult};

/// Event types the synthesis consumes.
const EVENT_TYPES: &str = "ticker_change,delisted";

/// A parsed ticker event in chronological order.
#[derive(Clone, Debug)]
enum SymbolEvent {
    /// The security stopped trading under `ticker` at the end of the day
    /// before `date`.
    TickerChange { date: NaiveDate, ticker: String },
    Delisted { date: NaiveDate },
}

impl SymbolEvent {
    const fn date(&self) -> NaiveDate {
        match self {
            Self::TickerChange { date, .. } | Self::Delisted { date } => *date,
        }
    }
}

/// Resolver over map files this provider already wrote to disk.
pub struct LocalDiskMapFileResolver {
    layout: DataLayout,
}

impl LocalDiskMapFileResolver {
    /// Creates a resolver reading under `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout: DataLayout::new(data_dir),
        }
    }
}

impl MapFileResolver for LocalDiskMapFileResolver {
    fn resolve(&self, ticker: &str, _date: NaiveDate) -> Option<MapFile> {
        let contents = std::fs::read_to_string(self.layout.map_file(ticker)).ok()?;
        MapFile::parse(ticker, &contents).ok().filter(|f| !f.is_empty())
    }
}

/// Materializes map files from ticker-event history.
pub struct MapFileEngine {
    gateway: Arc<dyn RestGateway>,
    resolver: Arc<dyn MapFileResolver>,
    layout: DataLayout,
    locks: KeyedSingleflight,
}

impl MapFileEngine {
    /// Creates an engine with an explicit resolver seam.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn RestGateway>,
        resolver: Arc<dyn MapFileResolver>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            resolver,
            layout: DataLayout::new(data_dir),
            locks: KeyedSingleflight::new(),
        }
    }

    /// Creates an engine whose resolver reads this provider's own output
    /// directory.
    #[must_use]
    pub fn with_local_resolver(
        gateway: Arc<dyn RestGateway>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        let data_dir = data_dir.into();
        let resolver = Arc::new(LocalDiskMapFileResolver::new(data_dir.clone()));
        Self::new(gateway, resolver, data_dir)
    }

    /// Returns the map file covering `symbol` on `date`, synthesizing one
    /// from upstream ticker events when nothing usable exists locally.
    pub async fn resolve(&self, symbol: &Symbol, date: NaiveDate) -> Option<MapFile> {
        if !symbol.is_equity() {
            return None;
        }
        let ticker = symbol.ticker();
        let exchange = symbol.market().primary_exchange();

        if let Some(file) = self.resolver.resolve(ticker, date) {
            return Some(file);
        }

        let path = self.layout.map_file(ticker);
        let today = Utc::now().date_naive();

        self.locks
            .execute(ticker, false, || async move {
                if let Some(existing) = self.read_existing(&path, ticker).await {
                    if existing.is_fresh(today) {
                        return Some(existing);
                    }
                }

                let events = match self.fetch_events(ticker).await {
                    Ok(events) => events,
                    Err(err) => {
                        warn!(ticker, %err, "ticker-event fetch failed; serving minimal map file");
                        return Some(MapFile::minimal(ticker, exchange));
                    }
                };

                let file = synthesize(ticker, exchange, &events);
                if let Err(err) = write_atomic(&path, &file.to_csv()).await {
                    warn!(ticker, %err, "failed to persist map file");
                }
                Some(file)
            })
            .await
            .flatten()
    }

    async fn read_existing(&self, path: &Path, ticker: &str) -> Option<MapFile> {
        let contents = tokio::fs::read_to_string(path).await.ok()?;
        match MapFile::parse(ticker, &contents) {
            Ok(file) if !file.is_empty() => Some(file),
            Ok(_) => None,
            Err(err) => {
                warn!(ticker, %err, "discarding corrupt map file");
                let _ = tokio::fs::remove_file(path).await;
                None
            }
        }
    }

    /// Fetches rename and delisting events, ordered ascending by date.
    async fn fetch_events(&self, ticker: &str) -> refdata_core::Result<Vec<SymbolEvent>> {
        let resource = ticker_events_resource(ticker);
        let params = [("types", EVENT_TYPES), ("limit", "1000")];
        let items = self.gateway.fetch_pages(&resource, &params).await?;

        let mut events: Vec<SymbolEvent> = decode_items::<TickerEventsResult>(items)
            .into_iter()
            .flat_map(|r| r.events)
            .filter_map(|ev| {
                let date = NaiveDate::parse_from_str(&ev.date, "%Y-%m-%d").ok()?;
                match ev.kind.as_str() {
                    "ticker_change" => {
                        let ticker = ev.ticker_change?.ticker;
                        (!ticker.is_empty())
                            .then_some(SymbolEvent::TickerChange { date, ticker })
                    }
                    "delisted" => Some(SymbolEvent::Delisted { date }),
                    _ => None,
                }
            })
            .collect();
        events.sort_by_key(SymbolEvent::date);
        Ok(events)
    }
}

/// Synthesizes map-file rows from chronological ticker events.
///
/// Every rename closes its old ticker's window at the day before the event;
/// the requested ticker carries the final window through either the
/// delisting date or the far-future sentinel. Rows sharing a date keep the
/// last entry.
fn synthesize(ticker: &str, exchange: Exchange, events: &[SymbolEvent]) -> MapFile {
    let mut rows = vec![MapFileRow::new(earliest_sentinel_date(), ticker, exchange)];
    let mut delisted: Option<NaiveDate> = None;

    for event in events {
        match event {
            SymbolEvent::TickerChange { date, ticker: old_ticker } => {
                rows.push(MapFileRow::new(
                    *date - Duration::days(1),
                    old_ticker.as_str(),
                    exchange,
                ));
            }
            SymbolEvent::Delisted { date } => delisted = Some(*date),
        }
    }

    let end = delisted.unwrap_or_else(far_future_sentinel_date);
    rows.push(MapFileRow::new(end, ticker, exchange));

    // Dedup by date keeping the last row, sorted ascending.
    let deduped: BTreeMap<NaiveDate, MapFileRow> =
        rows.into_iter().map(|r| (r.date, r)).collect();
    MapFile::new(ticker, deduped.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubGateway;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn events_payload(events: serde_json::Value) -> serde_json::Value {
        json!({ "events": events })
    }

    fn engine(gateway: Arc<StubGateway>, dir: &tempfile::TempDir) -> MapFileEngine {
        MapFileEngine::with_local_resolver(gateway, dir.path())
    }

    #[tokio::test]
    async fn single_rename_produces_three_window_rows() {
        let dir = tempfile::tempdir().unwrap();
        // One rename: the security traded as OLD through 2019-04-30, as the
        // requested NEW from 2019-05-01 on.
        let gateway = Arc::new(StubGateway::new().with_pages(
            "v3/reference/tickers/NEW/events",
            vec![events_payload(json!([
                {"type": "ticker_change", "date": "2019-05-01", "ticker_change": {"ticker": "OLD"}},
            ]))],
        ));
        let engine = engine(gateway, &dir);

        let file = engine
            .resolve(&Symbol::equity("NEW"), date(2020, 1, 1))
            .await
            .unwrap();

        let expected = vec![
            MapFileRow::new(earliest_sentinel_date(), "NEW", Exchange::Nasdaq),
            MapFileRow::new(date(2019, 4, 30), "OLD", Exchange::Nasdaq),
            MapFileRow::new(far_future_sentinel_date(), "NEW", Exchange::Nasdaq),
        ];
        assert_eq!(file.rows(), expected.as_slice());

        let on_disk = std::fs::read_to_string(dir.path().join("equity/usa/map_files/new.csv"))
            .unwrap();
        assert_eq!(on_disk, file.to_csv());
    }

    #[tokio::test]
    async fn chained_renames_close_each_window() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(StubGateway::new().with_pages(
            "v3/reference/tickers/NEW/events",
            vec![events_payload(json!([
                {"type": "ticker_change", "date": "2010-06-29", "ticker_change": {"ticker": "OLDEST"}},
                {"type": "ticker_change", "date": "2019-05-01", "ticker_change": {"ticker": "OLD"}},
            ]))],
        ));
        let engine = engine(gateway, &dir);

        let file = engine
            .resolve(&Symbol::equity("NEW"), date(2020, 1, 1))
            .await
            .unwrap();

        let expected = vec![
            MapFileRow::new(earliest_sentinel_date(), "NEW", Exchange::Nasdaq),
            MapFileRow::new(date(2010, 6, 28), "OLDEST", Exchange::Nasdaq),
            MapFileRow::new(date(2019, 4, 30), "OLD", Exchange::Nasdaq),
            MapFileRow::new(far_future_sentinel_date(), "NEW", Exchange::Nasdaq),
        ];
        assert_eq!(file.rows(), expected.as_slice());
    }

    #[tokio::test]
    async fn delisting_closes_the_file_at_the_event_date() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(StubGateway::new().with_pages(
            "v3/reference/tickers/GONE/events",
            vec![events_payload(json!([
                {"type": "ticker_change", "date": "2005-02-01", "ticker_change": {"ticker": "GONE"}},
                {"type": "delisted", "date": "2021-03-15"},
            ]))],
        ));
        let engine = engine(gateway, &dir);

        let file = engine
            .resolve(&Symbol::equity("GONE"), date(2020, 1, 1))
            .await
            .unwrap();

        let last = file.rows().last().unwrap();
        assert_eq!(last.date, date(2021, 3, 15));
        assert_eq!(last.ticker, "GONE");
        // Exactly one end-of-life row, no far-future sentinel.
        assert_eq!(
            file.rows()
                .iter()
                .filter(|r| r.date >= date(2021, 3, 15))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn upstream_failure_serves_minimal_file_without_caching() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(
            StubGateway::new().with_failure("v3/reference/tickers/XYZ/events"),
        );
        let engine = engine(Arc::clone(&gateway), &dir);

        let file = engine
            .resolve(&Symbol::equity("XYZ"), date(2020, 1, 1))
            .await
            .unwrap();

        assert_eq!(file.rows().len(), 2);
        assert_eq!(file.rows()[0].ticker, "XYZ");
        assert_eq!(file.rows()[1].date, far_future_sentinel_date());
        assert!(!dir.path().join("equity/usa/map_files/xyz.csv").exists());

        // Not cached: the next resolve hits the upstream again.
        let _ = engine.resolve(&Symbol::equity("XYZ"), date(2020, 1, 1)).await;
        assert_eq!(gateway.calls_for("v3/reference/tickers/XYZ/events"), 2);
    }

    #[tokio::test]
    async fn local_resolver_short_circuits_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let existing = MapFile::minimal("AAPL", Exchange::Nasdaq);
        let path = dir.path().join("equity/usa/map_files/aapl.csv");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, existing.to_csv()).unwrap();

        let gateway = Arc::new(StubGateway::new());
        let engine = engine(Arc::clone(&gateway), &dir);

        let file = engine
            .resolve(&Symbol::equity("AAPL"), date(2024, 1, 2))
            .await
            .unwrap();
        assert_eq!(file, existing);
        assert_eq!(gateway.calls_for("v3/reference/tickers"), 0);
    }

    #[tokio::test]
    async fn non_equity_symbols_are_not_serviced() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(StubGateway::new());
        let engine = engine(gateway, &dir);

        let symbol = Symbol::new("ES", refdata_core::SecurityType::Future, refdata_core::Market::Usa);
        assert!(engine.resolve(&symbol, date(2024, 1, 2)).await.is_none());
    }

    #[test]
    fn synthesis_dedups_rows_sharing_a_date() {
        // Two renames on the same day collapse onto one row.
        let events = vec![
            SymbolEvent::TickerChange {
                date: date(2019, 5, 1),
                ticker: "OLD".to_string(),
            },
            SymbolEvent::TickerChange {
                date: date(2019, 5, 2),
                ticker: "MID".to_string(),
            },
            SymbolEvent::TickerChange {
                date: date(2019, 5, 2),
                ticker: "NEW".to_string(),
            },
        ];
        let file = synthesize("NEW", Exchange::Nasdaq, &events);
        let dates: Vec<NaiveDate> = file.rows().iter().map(|r| r.date).collect();
        let mut sorted = dates.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(dates, sorted);
        // The later entry for 2019-05-01 wins.
        let row = file.rows().iter().find(|r| r.date == date(2019, 5, 1)).unwrap();
        assert_eq!(row.ticker, "NEW");
        assert_eq!(
            file.rows().iter().find(|r| r.date == date(2019, 4, 30)).unwrap().ticker,
            "OLD"
        );
    }
}
