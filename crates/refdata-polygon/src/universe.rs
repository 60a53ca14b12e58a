//! Coarse-universe generation and per-date lookups.
//!
//! One CSV per trading day, one row per active common stock, built from the
//! full-market snapshot with per-ticker factor lookups fanned out under
//! bounded concurrency. Lookups go through a single-entry in-memory cache:
//! asking for a new date evicts the previously loaded day.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use refdata_core::{
    CoarseRow, FactorProvider, FundamentalProperty, KeyedSingleflight, RefDataError, Result,
    SecurityId, Symbol,
};

use crate::client::{RestGateway, SNAPSHOT_RESOURCE, TICKERS_RESOURCE};
use crate::fundamentals::Fundamentals;
use crate::layout::{write_atomic, DataLayout};
use crate::responses::{decode_items, SnapshotTicker, TickerListing};

/// The coarse rows of one date, keyed by stringified permanent identifier.
struct LoadedCoarse {
    date: NaiveDate,
    rows: HashMap<String, CoarseRow>,
}

/// Materializes coarse universe files and answers per-date property
/// lookups, delegating financial properties to the fundamentals service.
pub struct UniverseEngine {
    gateway: Arc<dyn RestGateway>,
    factors: Arc<dyn FactorProvider>,
    fundamentals: Arc<Fundamentals>,
    layout: DataLayout,
    locks: KeyedSingleflight,
    max_concurrent: usize,
    coarse_cache: tokio::sync::Mutex<Option<LoadedCoarse>>,
}

impl UniverseEngine {
    /// Creates an engine writing under `data_dir`, processing snapshot
    /// tickers with at most `max_concurrent` factor lookups in flight.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn RestGateway>,
        factors: Arc<dyn FactorProvider>,
        fundamentals: Arc<Fundamentals>,
        data_dir: impl Into<PathBuf>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            gateway,
            factors,
            fundamentals,
            layout: DataLayout::new(data_dir),
            locks: KeyedSingleflight::new(),
            max_concurrent: max_concurrent.max(1),
            coarse_cache: tokio::sync::Mutex::new(None),
        }
    }

    /// Materializes the coarse file for `date` unless it already exists.
    /// Failures are logged; the next request retries.
    pub async fn generate_for(&self, date: NaiveDate) {
        let path = self.layout.coarse_file(date);
        if path.exists() {
            return;
        }
        let key = format!("coarse-{}", date.format("%Y%m%d"));
        // Not `once`: a failed attempt must stay retryable on the next call.
        let _ = self
            .locks
            .execute(&key, false, || async move {
                if path.exists() {
                    return;
                }
                if let Err(err) = self.materialize(date, &path).await {
                    warn!(%date, %err, "coarse generation failed");
                }
            })
            .await;
    }

    async fn materialize(&self, date: NaiveDate, path: &Path) -> Result<()> {
        let active = self.fetch_active_tickers().await?;
        let snapshots = self.fetch_snapshot().await?;
        debug!(
            %date,
            active = active.len(),
            snapshots = snapshots.len(),
            "building coarse universe"
        );

        let work: Vec<(SnapshotTicker, SecurityId)> = snapshots
            .into_iter()
            .filter_map(|snap| {
                let id = active.get(&snap.ticker.to_uppercase())?.clone();
                Some((snap, id))
            })
            .collect();

        let mut rows: Vec<CoarseRow> = stream::iter(work)
            .map(|(snap, id)| self.coarse_row(date, snap, id))
            .buffer_unordered(self.max_concurrent)
            .filter_map(|row| async move { row })
            .collect()
            .await;

        rows.sort_by(|a, b| a.security_id.cmp(&b.security_id));

        let mut contents = String::new();
        for row in &rows {
            contents.push_str(&row.to_csv_line());
            contents.push('\n');
        }
        write_atomic(path, &contents).await?;
        debug!(%date, rows = rows.len(), "coarse universe written");
        Ok(())
    }

    /// One snapshot ticker to one coarse row. Missing bars and non-positive
    /// closes or volumes are skipped; factor lookups degrade to unit
    /// factors.
    async fn coarse_row(
        &self,
        date: NaiveDate,
        snap: SnapshotTicker,
        security_id: SecurityId,
    ) -> Option<CoarseRow> {
        let bar = snap.prev_day.or(snap.day)?;
        if bar.close <= 0.0 || bar.volume <= 0.0 {
            return None;
        }
        let ticker = snap.ticker.to_uppercase();

        let (price_factor, split_factor) = match self.factors.factor_file(&Symbol::equity(&ticker)).await
        {
            Some(file) => file.factors_on(date),
            None => (1.0, 1.0),
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let volume = bar.volume as u64;
        Some(CoarseRow {
            security_id,
            ticker,
            close: bar.close,
            volume,
            dollar_volume: CoarseRow::dollar_volume_for(bar.close, volume),
            has_fundamentals: false,
            price_factor,
            split_factor,
        })
    }

    /// Active common-stock tickers mapped to their permanent identifiers
    /// (composite FIGI when the listing carries one, else the ticker).
    async fn fetch_active_tickers(&self) -> Result<HashMap<String, SecurityId>> {
        let params = [
            ("type", "CS"),
            ("market", "stocks"),
            ("active", "true"),
            ("limit", "1000"),
        ];
        let items = self.gateway.fetch_pages(TICKERS_RESOURCE, &params).await?;
        Ok(decode_items::<TickerListing>(items)
            .into_iter()
            .filter(|l| !l.ticker.is_empty())
            .map(|l| {
                let ticker = l.ticker.to_uppercase();
                let id = SecurityId::new(l.composite_figi.unwrap_or_else(|| ticker.clone()));
                (ticker, id)
            })
            .collect())
    }

    async fn fetch_snapshot(&self) -> Result<Vec<SnapshotTicker>> {
        let mut payload = self.gateway.fetch(SNAPSHOT_RESOURCE, &[]).await?;
        let tickers = payload
            .get_mut("tickers")
            .map(serde_json::Value::take)
            .and_then(|v| match v {
                serde_json::Value::Array(items) => Some(items),
                _ => None,
            })
            .ok_or_else(|| RefDataError::Parse("snapshot without tickers".to_string()))?;
        Ok(decode_items(tickers))
    }

    /// Returns the named property for a security on `date`.
    ///
    /// Financial properties delegate to the fundamentals service; coarse
    /// fields come from the per-date cache with a type-appropriate zero for
    /// absent securities. Unrecognized names yield NaN.
    #[allow(clippy::cast_precision_loss)]
    pub async fn get(&self, property: &str, date: NaiveDate, security_id: &SecurityId) -> f64 {
        if let Some(parsed) = FundamentalProperty::parse(property) {
            let Some(ticker) = self.ticker_for(date, security_id).await else {
                return f64::NAN;
            };
            return self.fundamentals.value(&ticker, date, &parsed).await;
        }

        let mut cache = self.coarse_cache.lock().await;
        self.ensure_coarse_loaded(&mut cache, date).await;
        let Some(loaded) = cache.as_ref().filter(|l| l.date == date) else {
            return 0.0;
        };
        let Some(row) = loaded.rows.get(security_id.as_str()) else {
            return 0.0;
        };

        match property {
            "Close" => row.close,
            "Volume" => row.volume as f64,
            "DollarVolume" => row.dollar_volume as f64,
            "PriceFactor" => row.price_factor,
            "SplitFactor" => row.split_factor,
            _ => f64::NAN,
        }
    }

    /// Resolves a permanent identifier to the ticker it traded under on
    /// `date`, via the coarse row.
    async fn ticker_for(&self, date: NaiveDate, security_id: &SecurityId) -> Option<String> {
        let mut cache = self.coarse_cache.lock().await;
        self.ensure_coarse_loaded(&mut cache, date).await;
        cache
            .as_ref()
            .filter(|l| l.date == date)?
            .rows
            .get(security_id.as_str())
            .map(|r| r.ticker.clone())
    }

    /// Rebuilds the single-entry cache for `date`. Concurrent requests for
    /// different dates serialize on the cache mutex the caller holds.
    async fn ensure_coarse_loaded(&self, cache: &mut Option<LoadedCoarse>, date: NaiveDate) {
        if cache.as_ref().is_some_and(|l| l.date == date) {
            return;
        }
        self.generate_for(date).await;

        let path = self.layout.coarse_file(date);
        let Ok(contents) = tokio::fs::read_to_string(&path).await else {
            // Generation failed; leave the previous day loaded and retry on
            // the next request.
            return;
        };
        let parsed: Result<HashMap<String, CoarseRow>> = contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                CoarseRow::parse_line(line).map(|row| (row.security_id.to_string(), row))
            })
            .collect();
        match parsed {
            Ok(rows) => *cache = Some(LoadedCoarse { date, rows }),
            Err(err) => {
                warn!(%date, %err, "deleting corrupt coarse file");
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
    }
}
