use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Admission control shared by all engine workers: each successful [`acquire`](Self::acquire)
/// grants one run.
#[derive(Debug)]
pub struct IterationGate {
    claimed: AtomicU64,
    limit: Option<u64>,
    deadline: Option<Instant>,
}

impl IterationGate {
    /// With neither a limit nor a duration the gate admits exactly one run.
    #[must_use]
    pub fn new(iterations: Option<u64>, duration: Option<Duration>, started: Instant) -> Self {
        let limit = match (iterations, duration) {
            (None, None) => Some(1),
            (iterations, _) => iterations,
        };
        Self {
            claimed: AtomicU64::new(0),
            limit,
            deadline: duration.map(|d| started + d),
        }
    }

    pub fn acquire(&self) -> bool {
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return false;
        }

        match self.limit {
            // Never step past the limit so `claimed` stays an exact count.
            Some(limit) => self
                .claimed
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < limit).then_some(n + 1)
                })
                .is_ok(),
            None => {
                self.claimed.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    #[must_use]
    pub fn claimed(&self) -> u64 {
        self.claimed.load(Ordering::Acquire)
    }
}
