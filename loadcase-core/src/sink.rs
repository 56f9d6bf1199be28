use std::sync::Arc;

use loadcase_stats::{Category, EntrySummary, StatsRegistry};
use parking_lot::Mutex;

/// Receiver of run outcomes. Called concurrently from many runs; implementations must not
/// block for long and never influence the run that reports to them.
pub trait ResultSink: Send + Sync {
    fn record_success(&self, kind: &str, name: &str, elapsed_ms: i64, bytes: i64);

    fn record_failure(&self, kind: &str, name: &str, elapsed_ms: i64, error: &str);

    fn record_transaction(&self, name: &str, success: bool, elapsed_ms: i64, extra: i64);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Success {
        kind: String,
        name: String,
        elapsed_ms: i64,
        bytes: i64,
    },
    Failure {
        kind: String,
        name: String,
        elapsed_ms: i64,
        error: String,
    },
    Transaction {
        name: String,
        success: bool,
        elapsed_ms: i64,
        extra: i64,
    },
}

impl SinkEvent {
    #[must_use]
    pub fn success(kind: &str, name: &str, elapsed_ms: i64, bytes: i64) -> Self {
        Self::Success {
            kind: kind.to_string(),
            name: name.to_string(),
            elapsed_ms,
            bytes,
        }
    }

    #[must_use]
    pub fn failure(kind: &str, name: &str, elapsed_ms: i64, error: &str) -> Self {
        Self::Failure {
            kind: kind.to_string(),
            name: name.to_string(),
            elapsed_ms,
            error: error.to_string(),
        }
    }

    #[must_use]
    pub fn transaction(name: &str, success: bool, elapsed_ms: i64, extra: i64) -> Self {
        Self::Transaction {
            name: name.to_string(),
            success,
            elapsed_ms,
            extra,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Success { name, .. }
            | Self::Failure { name, .. }
            | Self::Transaction { name, .. } => name,
        }
    }
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn transactions_named(&self, name: &str) -> Vec<SinkEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Transaction { .. }) && e.name() == name)
            .cloned()
            .collect()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().push(event);
    }
}

impl ResultSink for RecordingSink {
    fn record_success(&self, kind: &str, name: &str, elapsed_ms: i64, bytes: i64) {
        self.push(SinkEvent::success(kind, name, elapsed_ms, bytes));
    }

    fn record_failure(&self, kind: &str, name: &str, elapsed_ms: i64, error: &str) {
        self.push(SinkEvent::failure(kind, name, elapsed_ms, error));
    }

    fn record_transaction(&self, name: &str, success: bool, elapsed_ms: i64, extra: i64) {
        self.push(SinkEvent::transaction(name, success, elapsed_ms, extra));
    }
}

/// Aggregates events into step and transaction statistics.
#[derive(Debug, Default)]
pub struct StatsSink {
    registry: StatsRegistry,
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub steps: Vec<EntrySummary>,
    pub transactions: Vec<EntrySummary>,
}

impl Report {
    #[must_use]
    pub fn step(&self, kind: &str, name: &str) -> Option<&EntrySummary> {
        self.steps
            .iter()
            .find(|s| s.key.kind.as_ref() == kind && s.key.name.as_ref() == name)
    }

    #[must_use]
    pub fn transaction(&self, name: &str) -> Option<&EntrySummary> {
        self.transactions
            .iter()
            .find(|s| s.key.name.as_ref() == name)
    }
}

impl StatsSink {
    #[must_use]
    pub fn registry(&self) -> &StatsRegistry {
        &self.registry
    }

    #[must_use]
    pub fn report(&self) -> Report {
        Report {
            steps: self.registry.summarize_category(Category::Step),
            transactions: self.registry.summarize_category(Category::Transaction),
        }
    }
}

impl ResultSink for StatsSink {
    fn record_success(&self, kind: &str, name: &str, elapsed_ms: i64, bytes: i64) {
        self.registry.record_success(kind, name, elapsed_ms, bytes);
    }

    fn record_failure(&self, kind: &str, name: &str, elapsed_ms: i64, error: &str) {
        self.registry.record_failure(kind, name, elapsed_ms, error);
    }

    fn record_transaction(&self, name: &str, success: bool, elapsed_ms: i64, extra: i64) {
        self.registry
            .record_transaction(name, success, elapsed_ms, extra);
    }
}

/// Logs every event, then forwards it. Installed when a load test runs in debug mode.
pub struct TracingSink {
    inner: Arc<dyn ResultSink>,
}

impl TracingSink {
    #[must_use]
    pub fn new(inner: Arc<dyn ResultSink>) -> Self {
        Self { inner }
    }
}

impl ResultSink for TracingSink {
    fn record_success(&self, kind: &str, name: &str, elapsed_ms: i64, bytes: i64) {
        tracing::debug!(kind, name, elapsed_ms, bytes, "step succeeded");
        self.inner.record_success(kind, name, elapsed_ms, bytes);
    }

    fn record_failure(&self, kind: &str, name: &str, elapsed_ms: i64, error: &str) {
        tracing::debug!(kind, name, elapsed_ms, error, "step failed");
        self.inner.record_failure(kind, name, elapsed_ms, error);
    }

    fn record_transaction(&self, name: &str, success: bool, elapsed_ms: i64, extra: i64) {
        tracing::debug!(name, success, elapsed_ms, "transaction recorded");
        self.inner
            .record_transaction(name, success, elapsed_ms, extra);
    }
}
