//! Stub collaborators shared by the engine tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use refdata_core::{FactorFile, FactorProvider, RefDataError, Result, Symbol};

use crate::client::RestGateway;

/// Canned gateway: responses are keyed by resource-path prefix, every call
/// is logged with its parameters, and selected resources can be made to
/// fail.
#[derive(Default)]
pub(crate) struct StubGateway {
    pages: Vec<(String, Vec<Value>)>,
    singles: Vec<(String, Value)>,
    failures: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, resource: impl Into<String>, items: Vec<Value>) -> Self {
        self.pages.push((resource.into(), items));
        self
    }

    pub fn with_single(mut self, resource: impl Into<String>, value: Value) -> Self {
        self.singles.push((resource.into(), value));
        self
    }

    pub fn with_failure(mut self, resource: impl Into<String>) -> Self {
        self.failures.push(resource.into());
        self
    }

    pub fn calls_for(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn saw_call_containing(&self, needle: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|call| call.contains(needle))
    }

    fn log(&self, resource: &str, params: &[(&str, &str)]) {
        let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        self.calls
            .lock()
            .unwrap()
            .push(format!("{resource}?{}", query.join("&")));
    }

    fn fail_for(&self, resource: &str) -> Option<RefDataError> {
        self.failures
            .iter()
            .any(|f| resource.starts_with(f.as_str()))
            .then(|| RefDataError::Upstream("stub failure".to_string()))
    }
}

#[async_trait]
impl RestGateway for StubGateway {
    async fn fetch_pages(&self, resource: &str, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        self.log(resource, params);
        if let Some(err) = self.fail_for(resource) {
            return Err(err);
        }
        Ok(self
            .pages
            .iter()
            .find(|(key, _)| resource.starts_with(key.as_str()))
            .map(|(_, items)| items.clone())
            .unwrap_or_default())
    }

    async fn fetch(&self, resource: &str, params: &[(&str, &str)]) -> Result<Value> {
        self.log(resource, params);
        if let Some(err) = self.fail_for(resource) {
            return Err(err);
        }
        self.singles
            .iter()
            .find(|(key, _)| resource.starts_with(key.as_str()))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| RefDataError::Upstream("no stub response".to_string()))
    }
}

/// One unadjusted daily bar in the aggregates wire shape.
pub(crate) fn bar(date: NaiveDate, close: f64) -> Value {
    let millis = date
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
        .and_utc()
        .timestamp_millis();
    json!({"t": millis, "c": close})
}

/// Factor provider backed by canned files.
#[derive(Default)]
pub(crate) struct StubFactors {
    files: Mutex<HashMap<String, FactorFile>>,
}

impl StubFactors {
    pub fn with_file(self, file: FactorFile) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(file.ticker().to_string(), file);
        self
    }
}

#[async_trait]
impl FactorProvider for StubFactors {
    async fn factor_file(&self, symbol: &Symbol) -> Option<FactorFile> {
        self.files.lock().unwrap().get(symbol.ticker()).cloned()
    }
}
