use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,

    #[error("notification transport error: {0}")]
    Transport(String),
}

/// A lifecycle event for the analytics channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingEvent {
    Event {
        category: String,
        action: String,
    },
    Timing {
        category: String,
        variable: String,
        duration: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTracking {
    pub category: String,
    pub action: String,
}

impl EventTracking {
    #[must_use]
    pub fn new(category: &str, action: &str) -> Self {
        Self {
            category: category.to_string(),
            action: action.to_string(),
        }
    }

    #[must_use]
    pub fn event(&self) -> TrackingEvent {
        TrackingEvent::Event {
            category: self.category.clone(),
            action: self.action.clone(),
        }
    }

    /// Start timing `variable`; the clock runs until [`TimingTracking::finish`].
    #[must_use]
    pub fn start_timing(&self, variable: &str) -> TimingTracking {
        TimingTracking {
            category: self.category.clone(),
            variable: variable.to_string(),
            started: Instant::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimingTracking {
    category: String,
    variable: String,
    started: Instant,
}

impl TimingTracking {
    #[must_use]
    pub fn finish(self) -> TrackingEvent {
        TrackingEvent::Timing {
            duration: self.started.elapsed(),
            category: self.category,
            variable: self.variable,
        }
    }
}

/// Best-effort analytics transport.
pub trait Notifier: Send + Sync {
    fn send(&self, event: TrackingEvent) -> BoxFuture<'static, Result<(), NotifyError>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn send(&self, _event: TrackingEvent) -> BoxFuture<'static, Result<(), NotifyError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<TrackingEvent>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TrackingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn send(&self, event: TrackingEvent) -> BoxFuture<'static, Result<(), NotifyError>> {
        let sent = self.tx.send(event).map_err(|_| NotifyError::Closed);
        Box::pin(async move { sent })
    }
}

/// Dispatch `event` on a detached task. The caller never waits for it; failures are only
/// logged.
pub fn notify_detached(notifier: &Arc<dyn Notifier>, event: TrackingEvent) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!(?event, "no runtime, dropping notification");
        return;
    };

    let send = notifier.send(event);
    handle.spawn(async move {
        if let Err(err) = send.await {
            tracing::warn!(error = %err, "analytics notification failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct FailingNotifier {
        attempts: Arc<AtomicUsize>,
    }

    impl Notifier for FailingNotifier {
        fn send(&self, _event: TrackingEvent) -> BoxFuture<'static, Result<(), NotifyError>> {
            let attempts = self.attempts.clone();
            Box::pin(async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(NotifyError::Transport("offline".to_string()))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timing_measures_until_finish() {
        let tracking = EventTracking::new("RunLoadTests", "run");
        let timing = tracking.start_timing("execution");
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(
            timing.finish(),
            TrackingEvent::Timing {
                category: "RunLoadTests".to_string(),
                variable: "execution".to_string(),
                duration: Duration::from_millis(250),
            }
        );
    }

    #[tokio::test]
    async fn detached_delivery_reaches_channel() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);

        let event = EventTracking::new("RunLoadTests", "run").event();
        notify_detached(&notifier, event.clone());
        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn failed_delivery_is_attempted_and_swallowed() {
        let failing = FailingNotifier::default();
        let attempts = failing.attempts.clone();
        let notifier: Arc<dyn Notifier> = Arc::new(failing);

        notify_detached(&notifier, EventTracking::new("c", "a").event());
        for _ in 0..16 {
            if attempts.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_channel_reports_error() {
        let (notifier, rx) = ChannelNotifier::channel();
        drop(rx);
        let event = EventTracking::new("c", "a").event();
        let result = futures::executor::block_on(notifier.send(event));
        assert_eq!(result, Err(NotifyError::Closed));
    }

    #[test]
    fn outside_a_runtime_notifications_are_dropped() {
        let notifier: Arc<dyn Notifier> = Arc::new(NoopNotifier);
        notify_detached(&notifier, EventTracking::new("c", "a").event());
    }
}
