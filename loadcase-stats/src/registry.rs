use std::sync::Arc;

use dashmap::DashMap;

use crate::entry::{EntryStats, EntrySummary};
use crate::key::{Category, EntryKey};

/// Concurrent registry of per-step and per-transaction statistics.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    entries: DashMap<EntryKey, Arc<EntryStats>>,
}

impl StatsRegistry {
    pub fn entry(&self, key: EntryKey) -> Arc<EntryStats> {
        if let Some(existing) = self.entries.get(&key) {
            return existing.value().clone();
        }

        self.entries.entry(key).or_default().value().clone()
    }

    pub fn record_success(&self, kind: &str, name: &str, elapsed_ms: i64, bytes: i64) {
        self.entry(EntryKey::step(kind, name))
            .record_success(elapsed_ms, bytes);
    }

    pub fn record_failure(&self, kind: &str, name: &str, elapsed_ms: i64, error: &str) {
        self.entry(EntryKey::step(kind, name))
            .record_failure(elapsed_ms, Some(error));
    }

    pub fn record_transaction(&self, name: &str, success: bool, elapsed_ms: i64, bytes: i64) {
        let entry = self.entry(EntryKey::transaction(name));
        if success {
            entry.record_success(elapsed_ms, bytes);
        } else {
            entry.record_failure(elapsed_ms, None);
        }
    }

    /// Snapshot every entry, steps first, then transactions, each sorted by kind and name.
    #[must_use]
    pub fn summarize(&self) -> Vec<EntrySummary> {
        let mut out: Vec<EntrySummary> = self
            .entries
            .iter()
            .map(|e| e.value().summarize(e.key()))
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    #[must_use]
    pub fn summarize_category(&self, category: Category) -> Vec<EntrySummary> {
        let mut out = self.summarize();
        out.retain(|s| s.key.category == category);
        out
    }
}
