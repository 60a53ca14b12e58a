//! Point-in-time fundamental lookups backed by a dual-tier filing cache.
//!
//! Per ticker, quarterly filings live both in memory (with a load
//! timestamp) and on disk as pretty-printed JSON. Lookups take the fast
//! path when the in-memory tier is current; otherwise the disk tier is
//! tried before the upstream is paged, all under a per-ticker singleflight
//! lock. An upstream failure leaves the cache unloaded so the next call
//! retries.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

use refdata_core::fundamentals::property_value;
use refdata_core::{
    FilingRecord, FundamentalProperty, KeyedSingleflight, Result, Timeframe,
};

use crate::client::{RestGateway, FINANCIALS_RESOURCE};
use crate::layout::{write_atomic, DataLayout};
use crate::responses::{decode_items, FinancialsItem, FinancialsPayload};

/// In-memory tier entry.
#[derive(Clone)]
struct CachedFilings {
    filings: Arc<Vec<FilingRecord>>,
    loaded_at: DateTime<Utc>,
}

/// Per-ticker filing cache and property valuation service.
pub struct Fundamentals {
    gateway: Arc<dyn RestGateway>,
    layout: DataLayout,
    locks: KeyedSingleflight,
    cache_hours: u32,
    live_mode: bool,
    cache: tokio::sync::RwLock<HashMap<String, CachedFilings>>,
}

impl Fundamentals {
    /// Creates a service writing its fine JSON tier under `data_dir`.
    ///
    /// In batch mode (`live_mode = false`) a loaded filing list never ages
    /// out; in live mode both tiers expire after `cache_hours`.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn RestGateway>,
        data_dir: impl Into<PathBuf>,
        cache_hours: u32,
        live_mode: bool,
    ) -> Self {
        Self {
            gateway,
            layout: DataLayout::new(data_dir),
            locks: KeyedSingleflight::new(),
            cache_hours,
            live_mode,
            cache: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Seeds the in-memory tier with fixture filings, keyed by ticker.
    ///
    /// Tests use this seam instead of reaching into the cache.
    #[must_use]
    pub fn with_fixtures(self, fixtures: HashMap<String, Vec<FilingRecord>>) -> Self {
        {
            let mut cache = self
                .cache
                .try_write()
                .expect("fixture seeding before first use");
            for (ticker, filings) in fixtures {
                cache.insert(
                    ticker.to_uppercase(),
                    CachedFilings {
                        filings: Arc::new(filings),
                        loaded_at: Utc::now(),
                    },
                );
            }
        }
        self
    }

    /// Evaluates `property` for `ticker` as of `date`. Missing data of any
    /// kind yields NaN.
    pub async fn value(&self, ticker: &str, date: NaiveDate, property: &FundamentalProperty) -> f64 {
        let filings = self.ensure_loaded(ticker).await;
        property_value(&filings, date, property)
    }

    /// Loads the ticker's filing list through the tiers, returning an empty
    /// list (uncached) when the upstream cannot be reached.
    pub async fn ensure_loaded(&self, ticker: &str) -> Arc<Vec<FilingRecord>> {
        let ticker = ticker.to_uppercase();
        let key = ticker.as_str();

        if let Some(filings) = self.cached_if_fresh(key).await {
            return filings;
        }

        self.locks
            .execute(key, false, || async move {
                if let Some(filings) = self.cached_if_fresh(key).await {
                    return filings;
                }
                if let Some(filings) = self.load_from_disk(key).await {
                    return filings;
                }
                match self.download(key).await {
                    Ok(filings) => self.store(key, filings).await,
                    Err(err) => {
                        warn!(ticker = key, %err, "filing download failed; will retry next call");
                        Arc::new(Vec::new())
                    }
                }
            })
            .await
            .unwrap_or_default()
    }

    /// Fast path: the in-memory tier, gated by age in live mode only.
    async fn cached_if_fresh(&self, key: &str) -> Option<Arc<Vec<FilingRecord>>> {
        let cache = self.cache.read().await;
        let entry = cache.get(key)?;
        if self.live_mode {
            let age = Utc::now().signed_duration_since(entry.loaded_at);
            if age >= chrono::Duration::hours(i64::from(self.cache_hours)) {
                return None;
            }
        }
        Some(Arc::clone(&entry.filings))
    }

    /// Disk tier: accepted in batch mode regardless of age, in live mode
    /// only while the file's mtime is younger than the cache window.
    /// Corrupt files are deleted so the next step re-downloads.
    async fn load_from_disk(&self, key: &str) -> Option<Arc<Vec<FilingRecord>>> {
        let path = self.layout.fine_file(key);
        let metadata = tokio::fs::metadata(&path).await.ok()?;

        if self.live_mode {
            let age = metadata
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .unwrap_or(StdDuration::MAX);
            if age >= StdDuration::from_secs(u64::from(self.cache_hours) * 3600) {
                return None;
            }
        }

        let contents = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str::<Vec<FilingRecord>>(&contents) {
            Ok(filings) => {
                debug!(ticker = key, count = filings.len(), "filings loaded from disk");
                Some(self.store_memory_only(key, filings).await)
            }
            Err(err) => {
                warn!(ticker = key, %err, "deleting corrupt filing cache");
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }

    /// Pages the upstream for quarterly filings, dropping records without a
    /// valid filing date and sorting ascending.
    async fn download(&self, key: &str) -> Result<Vec<FilingRecord>> {
        let params = [
            ("ticker", key),
            ("timeframe", "quarterly"),
            ("order", "asc"),
            ("sort", "filing_date"),
            ("limit", "100"),
        ];
        let items = self.gateway.fetch_pages(FINANCIALS_RESOURCE, &params).await?;
        let mut filings: Vec<FilingRecord> = decode_items::<FinancialsItem>(items)
            .into_iter()
            .filter_map(|item| filing_from_item(key, item))
            .collect();
        filings.sort_by_key(|f| f.filing_date);
        debug!(ticker = key, count = filings.len(), "filings downloaded");
        Ok(filings)
    }

    /// Persists a downloaded list to both tiers.
    async fn store(&self, key: &str, filings: Vec<FilingRecord>) -> Arc<Vec<FilingRecord>> {
        match serde_json::to_string_pretty(&filings) {
            Ok(json) => {
                if let Err(err) = write_atomic(&self.layout.fine_file(key), &json).await {
                    warn!(ticker = key, %err, "failed to persist filing cache");
                }
            }
            Err(err) => warn!(ticker = key, %err, "failed to serialize filing cache"),
        }
        self.store_memory_only(key, filings).await
    }

    async fn store_memory_only(&self, key: &str, filings: Vec<FilingRecord>) -> Arc<Vec<FilingRecord>> {
        let filings = Arc::new(filings);
        let mut cache = self.cache.write().await;
        cache.insert(
            key.to_string(),
            CachedFilings {
                filings: Arc::clone(&filings),
                loaded_at: Utc::now(),
            },
        );
        filings
    }
}

/// Converts one upstream filing into a [`FilingRecord`]. Records without a
/// parseable filing date do not exist as far as lookups are concerned.
fn filing_from_item(ticker: &str, item: FinancialsItem) -> Option<FilingRecord> {
    let filing_date = item
        .filing_date
        .as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())?;
    let timeframe = match item.timeframe.as_str() {
        "quarterly" => Timeframe::Quarterly,
        "annual" => Timeframe::Annual,
        _ => return None,
    };
    let parse_date = |s: &Option<String>| {
        s.as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    };

    Some(FilingRecord {
        ticker: ticker.to_uppercase(),
        fiscal_year: item.fiscal_year.parse().unwrap_or(0),
        fiscal_period: item.fiscal_period,
        start_date: parse_date(&item.start_date),
        end_date: parse_date(&item.end_date),
        filing_date,
        timeframe,
        income: FinancialsPayload::collapse(&item.financials.income_statement),
        balance: FinancialsPayload::collapse(&item.financials.balance_sheet),
        cash_flow: FinancialsPayload::collapse(&item.financials.cash_flow_statement),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubGateway;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn filing_item(filing_date: &str, revenues: f64) -> serde_json::Value {
        json!({
            "filing_date": filing_date,
            "fiscal_period": "Q1",
            "fiscal_year": "2023",
            "timeframe": "quarterly",
            "financials": {
                "income_statement": {"revenues": {"value": revenues}},
            },
        })
    }

    fn service(gateway: Arc<StubGateway>, dir: &tempfile::TempDir) -> Fundamentals {
        Fundamentals::new(gateway, dir.path(), 24, false)
    }

    #[tokio::test]
    async fn download_populates_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(StubGateway::new().with_pages(
            FINANCIALS_RESOURCE,
            vec![
                filing_item("2023-05-05", 110_000.0),
                filing_item("2023-02-03", 100_000.0),
            ],
        ));
        let service = service(Arc::clone(&gateway), &dir);

        let filings = service.ensure_loaded("aapl").await;
        assert_eq!(filings.len(), 2);
        // Sorted ascending by filing date regardless of response order.
        assert_eq!(filings[0].filing_date, date(2023, 2, 3));
        assert_eq!(filings[0].income.get("revenues"), Some(&100_000.0));

        let path = dir.path().join("equity/usa/fundamental/fine/polygon/aapl.json");
        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains('\n')); // pretty-printed

        // Memory tier satisfies the second call.
        let again = service.ensure_loaded("AAPL").await;
        assert_eq!(again.len(), 2);
        assert_eq!(gateway.calls_for(FINANCIALS_RESOURCE), 1);
    }

    #[tokio::test]
    async fn disk_tier_is_reused_across_instances_in_batch_mode() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(StubGateway::new().with_pages(
            FINANCIALS_RESOURCE,
            vec![filing_item("2023-02-03", 100_000.0)],
        ));
        service(Arc::clone(&gateway), &dir)
            .ensure_loaded("AAPL")
            .await;

        // New instance, failing gateway: the disk tier must satisfy it.
        let offline = Arc::new(StubGateway::new().with_failure(FINANCIALS_RESOURCE));
        let second = service(Arc::clone(&offline), &dir);
        let filings = second.ensure_loaded("AAPL").await;
        assert_eq!(filings.len(), 1);
        assert_eq!(offline.calls_for(FINANCIALS_RESOURCE), 0);
    }

    #[tokio::test]
    async fn corrupt_disk_cache_is_deleted_and_redownloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("equity/usa/fundamental/fine/polygon/aapl.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json ]").unwrap();

        let gateway = Arc::new(StubGateway::new().with_pages(
            FINANCIALS_RESOURCE,
            vec![filing_item("2023-02-03", 100_000.0)],
        ));
        let service = service(Arc::clone(&gateway), &dir);

        let filings = service.ensure_loaded("AAPL").await;
        assert_eq!(filings.len(), 1);
        assert_eq!(gateway.calls_for(FINANCIALS_RESOURCE), 1);
        // Rewritten with valid contents.
        let reloaded: Vec<FilingRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn upstream_failure_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(StubGateway::new().with_failure(FINANCIALS_RESOURCE));
        let service = service(Arc::clone(&gateway), &dir);

        assert!(service.ensure_loaded("AAPL").await.is_empty());
        assert!(service.ensure_loaded("AAPL").await.is_empty());
        // Both calls reached the upstream: nothing was marked loaded.
        assert_eq!(gateway.calls_for(FINANCIALS_RESOURCE), 2);
        assert!(!dir
            .path()
            .join("equity/usa/fundamental/fine/polygon/aapl.json")
            .exists());
    }

    #[tokio::test]
    async fn invalid_filing_dates_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(StubGateway::new().with_pages(
            FINANCIALS_RESOURCE,
            vec![
                filing_item("2023-02-03", 100_000.0),
                json!({"fiscal_period": "Q2", "timeframe": "quarterly"}),
                filing_item("not-a-date", 9.0),
            ],
        ));
        let service = service(gateway, &dir);

        let filings = service.ensure_loaded("AAPL").await;
        assert_eq!(filings.len(), 1);
    }

    #[tokio::test]
    async fn value_answers_ttm_from_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(StubGateway::new());

        let mut filings = Vec::new();
        for (fd, revenue) in [
            (date(2023, 2, 3), 100_000.0),
            (date(2023, 5, 5), 110_000.0),
            (date(2023, 8, 4), 120_000.0),
            (date(2023, 11, 3), 130_000.0),
        ] {
            let mut filing = FilingRecord {
                ticker: "AAPL".to_string(),
                filing_date: fd,
                timeframe: Timeframe::Quarterly,
                ..Default::default()
            };
            filing.income.insert("revenues".to_string(), revenue);
            filings.push(filing);
        }
        let service = service(Arc::clone(&gateway), &dir)
            .with_fixtures(HashMap::from([("AAPL".to_string(), filings)]));

        let property = FundamentalProperty::parse(
            "FinancialStatements_IncomeStatement_TotalRevenue_TwelveMonths",
        )
        .unwrap();
        let value = service.value("AAPL", date(2023, 12, 1), &property).await;
        assert_eq!(value, 460_000.0);
        // Fixtures satisfied the lookup; the upstream was never touched.
        assert_eq!(gateway.calls_for(FINANCIALS_RESOURCE), 0);
    }
}
