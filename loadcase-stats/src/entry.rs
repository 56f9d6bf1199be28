use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::histogram::{LatencySummary, new_latency_histogram, record_ms, summarize_latency};
use crate::key::EntryKey;

/// Live counters for one step or transaction name.
#[derive(Debug)]
pub struct EntryStats {
    successes: AtomicU64,
    failures: AtomicU64,
    bytes: AtomicU64,
    latency: Mutex<Histogram<u64>>,
    errors: Mutex<ahash::AHashMap<Arc<str>, u64>>,
}

impl Default for EntryStats {
    fn default() -> Self {
        Self {
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            latency: Mutex::new(new_latency_histogram()),
            errors: Mutex::new(ahash::AHashMap::new()),
        }
    }
}

impl EntryStats {
    pub fn record_success(&self, elapsed_ms: i64, bytes: i64) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.bytes
            .fetch_add(u64::try_from(bytes).unwrap_or(0), Ordering::Relaxed);
        record_ms(&mut self.latency.lock(), elapsed_ms);
    }

    pub fn record_failure(&self, elapsed_ms: i64, error: Option<&str>) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        record_ms(&mut self.latency.lock(), elapsed_ms);

        if let Some(error) = error {
            let mut errors = self.errors.lock();
            match errors.get_mut(error) {
                Some(n) => *n = n.saturating_add(1),
                None => {
                    errors.insert(Arc::from(error), 1);
                }
            }
        }
    }

    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn summarize(&self, key: &EntryKey) -> EntrySummary {
        let latency = summarize_latency(&self.latency.lock());

        let mut errors: Vec<(String, u64)> = self
            .errors
            .lock()
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        // Most frequent first; ties broken by message for a stable report.
        errors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        EntrySummary {
            key: key.clone(),
            successes: self.successes(),
            failures: self.failures(),
            bytes_total: self.bytes.load(Ordering::Relaxed),
            latency,
            errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntrySummary {
    pub key: EntryKey,
    pub successes: u64,
    pub failures: u64,
    pub bytes_total: u64,
    pub latency: LatencySummary,
    pub errors: Vec<(String, u64)>,
}

impl EntrySummary {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.successes.saturating_add(self.failures)
    }

    #[must_use]
    pub fn failure_rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.failures as f64 / total as f64)
    }
}
