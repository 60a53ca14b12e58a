//! Per-key mutual exclusion with work-elision.
//!
//! Engines materialize on-disk artifacts keyed by symbol or date. Many
//! callers may race to materialize the same key; [`KeyedSingleflight`]
//! guarantees that, per key, work runs under an exclusive lock, and (when
//! requested) at most once per instance lifetime.
//!
//! The lock map only grows. Key cardinality is bounded by tickers and dates
//! and each entry is a single mutex plus a flag, so the growth is acceptable.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Per-key state: an exclusive lock and a completion flag.
#[derive(Debug, Default)]
struct Entry {
    lock: tokio::sync::Mutex<()>,
    done: AtomicBool,
}

/// Keyed mutual exclusion with optional once-per-lifetime elision.
///
/// Callers follow the double-checked pattern: inspect state, enter
/// [`execute`](Self::execute) for the key, re-inspect inside the closure,
/// and only then do the work.
#[derive(Debug, Default)]
pub struct KeyedSingleflight {
    entries: Mutex<HashMap<String, Arc<Entry>>>,
}

impl KeyedSingleflight {
    /// Creates an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<Entry> {
        let mut map = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(key.to_string()).or_default())
    }

    /// Runs `work` under the exclusive lock for `key`.
    ///
    /// Concurrent callers for the same key serialize; distinct keys proceed
    /// in parallel. When `once` is true and a concurrent caller has already
    /// completed work for `key` during this instance's lifetime, returns
    /// `None` without invoking `work` again; with `once` false the work
    /// always runs and the result is always `Some`. A panic inside `work`
    /// propagates to the caller and leaves the key's completion flag unset.
    pub async fn execute<T, F, Fut>(&self, key: &str, once: bool, work: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let entry = self.entry(key);
        let _guard = entry.lock.lock().await;
        if once && entry.done.load(Ordering::Acquire) {
            return None;
        }
        let out = work().await;
        entry.done.store(true, Ordering::Release);
        Some(out)
    }
}
