//! Polygon REST gateway.
//!
//! Engines consume the upstream API through the [`RestGateway`] trait: they
//! pass a resource path plus a parameter list and receive decoded JSON
//! items, never touching URLs or authentication. [`PolygonRestClient`] is
//! the production implementation; it follows `next_url` continuation links
//! transparently until a listing is exhausted.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use refdata_core::{RefDataError, Result};

/// Base URL for the Polygon REST API.
const POLYGON_BASE_URL: &str = "https://api.polygon.io";

/// HTTP timeout for upstream requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Splits listing resource.
pub const SPLITS_RESOURCE: &str = "v3/reference/splits";
/// Dividends listing resource.
pub const DIVIDENDS_RESOURCE: &str = "v3/reference/dividends";
/// Active ticker listing resource.
pub const TICKERS_RESOURCE: &str = "v3/reference/tickers";
/// Full-market snapshot resource (single call, all tickers).
pub const SNAPSHOT_RESOURCE: &str = "v2/snapshot/locale/us/markets/stocks/tickers";
/// Quarterly financials resource.
pub const FINANCIALS_RESOURCE: &str = "vX/reference/financials";

/// Resource path for unadjusted daily aggregates of one ticker.
#[must_use]
pub fn aggregates_resource(ticker: &str, from: chrono::NaiveDate, to: chrono::NaiveDate) -> String {
    format!("v2/aggs/ticker/{ticker}/range/1/day/{from}/{to}")
}

/// Resource path for the ticker-event history of one ticker.
#[must_use]
pub fn ticker_events_resource(ticker: &str) -> String {
    format!("v3/reference/tickers/{ticker}/events")
}

/// Opaque pageable fetcher over the upstream REST API.
#[async_trait]
pub trait RestGateway: Send + Sync {
    /// Fetches every page of a listing resource and returns the concatenated
    /// `results` items. Continuation links are followed until exhausted.
    async fn fetch_pages(&self, resource: &str, params: &[(&str, &str)]) -> Result<Vec<Value>>;

    /// Fetches a single-response resource and returns the raw payload.
    async fn fetch(&self, resource: &str, params: &[(&str, &str)]) -> Result<Value>;
}

/// Production Polygon REST client.
///
/// Authenticates with a bearer token and maps HTTP failures onto
/// [`RefDataError`]: 429 becomes `RateLimited`, any other non-success status
/// becomes `Upstream`.
#[derive(Clone)]
pub struct PolygonRestClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for PolygonRestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolygonRestClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PolygonRestClient {
    /// Create a new client with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self::with_client(client, api_key)
    }

    /// Create a new client with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: POLYGON_BASE_URL.to_string(),
        }
    }

    /// Override the base URL (for exercising against a local server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the full URL for a resource and parameter list.
    fn url(&self, resource: &str, params: &[(&str, &str)]) -> String {
        let mut url = format!("{}/{resource}", self.base_url);
        for (i, (key, value)) in params.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        url
    }

    /// Make a GET request and parse the JSON response.
    async fn get(&self, url: &str) -> Result<Value> {
        tracing::debug!(url, "Polygon request");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| RefDataError::Upstream(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RefDataError::RateLimited {
                provider: "Polygon".to_string(),
                retry_after: None,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RefDataError::Upstream(format!("HTTP {status}: {text}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RefDataError::Upstream(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| RefDataError::Parse(e.to_string()))
    }
}

#[async_trait]
impl RestGateway for PolygonRestClient {
    async fn fetch_pages(&self, resource: &str, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(self.url(resource, params));

        while let Some(url) = next {
            let mut page = self.get(&url).await?;
            match page.get_mut("results").map(Value::take) {
                Some(Value::Array(batch)) => items.extend(batch),
                Some(Value::Null) | None => {}
                // Some resources return a single object under `results`.
                Some(other) => items.push(other),
            }
            next = page
                .get("next_url")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned);
        }

        Ok(items)
    }

    async fn fetch(&self, resource: &str, params: &[(&str, &str)]) -> Result<Value> {
        self.get(&self.url(resource, params)).await
    }
}
