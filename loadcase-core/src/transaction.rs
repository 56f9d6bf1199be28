use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// Nested transactions of the same name are not supported.
    #[error("transaction `{0}` is already open")]
    AlreadyOpen(String),

    #[error("transaction `{0}` was not started")]
    NotStarted(String),
}

#[derive(Debug, Clone)]
struct Span {
    name: Arc<str>,
    started: Instant,
    ended: Option<Instant>,
}

/// A transaction still open when its run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnclosedTransaction {
    pub name: Arc<str>,
    pub duration_ms: i64,
}

/// Per-run record of transaction boundaries.
#[derive(Debug, Default)]
pub struct TransactionTracker {
    // Few transactions per scenario; a vec keeps open order for the sweep.
    spans: Vec<Span>,
}

impl TransactionTracker {
    pub fn open(&mut self, name: &str, at: Instant) -> Result<(), TransactionError> {
        match self.spans.iter_mut().find(|s| s.name.as_ref() == name) {
            Some(span) if span.ended.is_none() => {
                Err(TransactionError::AlreadyOpen(name.to_string()))
            }
            Some(span) => {
                span.started = at;
                span.ended = None;
                Ok(())
            }
            None => {
                self.spans.push(Span {
                    name: Arc::from(name),
                    started: at,
                    ended: None,
                });
                Ok(())
            }
        }
    }

    /// Close an open transaction and return its duration in milliseconds.
    pub fn close(&mut self, name: &str, at: Instant) -> Result<i64, TransactionError> {
        let span = self
            .spans
            .iter_mut()
            .find(|s| s.name.as_ref() == name && s.ended.is_none())
            .ok_or_else(|| TransactionError::NotStarted(name.to_string()))?;

        span.ended = Some(at);
        Ok(millis(at.saturating_duration_since(span.started)))
    }

    #[must_use]
    pub fn is_open(&self, name: &str) -> bool {
        self.spans
            .iter()
            .any(|s| s.name.as_ref() == name && s.ended.is_none())
    }

    /// Close every still-open transaction at `end`, in the order they were opened.
    ///
    /// Consumes the tracker: a run sweeps exactly once.
    #[must_use]
    pub fn sweep_unclosed(self, end: Instant) -> Vec<UnclosedTransaction> {
        self.spans
            .into_iter()
            .filter(|s| s.ended.is_none())
            .map(|s| UnclosedTransaction {
                duration_ms: millis(end.saturating_duration_since(s.started)),
                name: s.name,
            })
            .collect()
    }
}

pub(crate) fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
