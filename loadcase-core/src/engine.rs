use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::{ConfigDuration, EngineOptions};
use crate::error::{Error, Result};
use crate::gate::IterationGate;
use crate::task::ScenarioTask;

/// Totals an engine hands back once every worker has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSummary {
    pub iterations_total: u64,
    pub iterations_failed: u64,
    pub elapsed: Duration,
}

/// Decides when and how often each task runs.
pub trait Engine: Send + Sync {
    fn run(
        &self,
        tasks: Vec<Arc<ScenarioTask>>,
    ) -> impl Future<Output = Result<EngineSummary>> + Send;
}

/// Smooth weighted round robin: over any window of `sum(weights)` picks, every task is chosen
/// exactly `weight` times, and picks of the same task are spread out.
#[derive(Debug)]
struct WeightedPicker {
    weights: Vec<i64>,
    current: Vec<i64>,
    total: i64,
}

impl WeightedPicker {
    fn new(weights: impl IntoIterator<Item = u32>) -> Self {
        let weights: Vec<i64> = weights.into_iter().map(i64::from).collect();
        let total = weights.iter().sum();
        Self {
            current: vec![0; weights.len()],
            weights,
            total,
        }
    }

    fn pick(&mut self) -> usize {
        let mut best = 0;
        for (i, weight) in self.weights.iter().enumerate() {
            self.current[i] += weight;
            if self.current[i] > self.current[best] {
                best = i;
            }
        }
        self.current[best] -= self.total;
        best
    }
}

/// Fixed-size worker pool driving tasks until the iteration gate closes.
#[derive(Debug, Clone)]
pub struct StandaloneEngine {
    workers: u64,
    iterations: Option<u64>,
    duration: Option<Duration>,
}

impl StandaloneEngine {
    pub fn from_options(opts: EngineOptions) -> Result<Self> {
        let workers = opts.workers.unwrap_or(1);
        if workers == 0 {
            return Err(Error::InvalidWorkers);
        }

        let duration = opts.duration.map(ConfigDuration::into_inner);

        // Default iterations is 1 unless duration mode is used.
        let iterations = opts
            .iterations
            .or_else(|| if duration.is_some() { None } else { Some(1) });
        if iterations == Some(0) {
            return Err(Error::InvalidIterations);
        }

        Ok(Self {
            workers,
            iterations,
            duration,
        })
    }

    #[must_use]
    pub fn workers(&self) -> u64 {
        self.workers
    }
}

impl Engine for StandaloneEngine {
    async fn run(&self, tasks: Vec<Arc<ScenarioTask>>) -> Result<EngineSummary> {
        if tasks.is_empty() {
            return Err(Error::NoScenarios);
        }

        let started = Instant::now();
        let gate = Arc::new(IterationGate::new(
            self.iterations,
            self.duration,
            started,
        ));
        let picker = Arc::new(Mutex::new(WeightedPicker::new(
            tasks.iter().map(|t| t.weight()),
        )));
        let tasks: Arc<[Arc<ScenarioTask>]> = Arc::from(tasks);
        let failed = Arc::new(AtomicU64::new(0));

        tracing::debug!(
            workers = self.workers,
            iterations = ?self.iterations,
            duration = ?self.duration,
            scenarios = tasks.len(),
            "standalone engine starting"
        );

        let mut handles = Vec::new();
        for worker in 0..self.workers {
            let gate = gate.clone();
            let picker = picker.clone();
            let tasks = tasks.clone();
            let failed = failed.clone();

            handles.push(tokio::spawn(async move {
                while gate.acquire() {
                    let idx = picker.lock().pick();
                    let Some(task) = tasks.get(idx) else {
                        break;
                    };
                    let report = task.run().await;
                    if !report.success {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                tracing::trace!(worker, "worker finished");
            }));
        }

        for h in handles {
            h.await?;
        }

        Ok(EngineSummary {
            iterations_total: gate.claimed(),
            iterations_failed: failed.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScenarioDefinition, ScenarioOptions};
    use crate::sink::{RecordingSink, ResultSink};
    use crate::step::{Step, StepError, StepReport, from_fn};
    use crate::task::WHOLE_RUN_TRANSACTION;

    fn task(name: &str, weight: i64, sink: Arc<dyn ResultSink>) -> Arc<ScenarioTask> {
        let cfg = ScenarioDefinition::new(
            ScenarioOptions {
                name: name.to_string(),
                weight: Some(weight),
                ..ScenarioOptions::default()
            },
            vec![Step::request(
                "noop",
                from_fn(|_| async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, StepError>(StepReport::default())
                }),
            )],
        )
        .into_config()
        .unwrap_or_else(|e| panic!("expected valid scenario: {e}"));
        Arc::new(ScenarioTask::new(Arc::new(cfg), sink))
    }

    #[test]
    fn picker_spreads_by_weight() {
        let mut picker = WeightedPicker::new([5, 1, 1]);
        let picks: Vec<usize> = (0..7).map(|_| picker.pick()).collect();
        assert_eq!(picks, vec![0, 0, 1, 0, 2, 0, 0]);
    }

    #[test]
    fn options_are_validated() {
        let zero_workers = EngineOptions {
            workers: Some(0),
            ..EngineOptions::default()
        };
        assert!(matches!(
            StandaloneEngine::from_options(zero_workers),
            Err(Error::InvalidWorkers)
        ));

        let zero_iterations = EngineOptions {
            iterations: Some(0),
            ..EngineOptions::default()
        };
        assert!(matches!(
            StandaloneEngine::from_options(zero_iterations),
            Err(Error::InvalidIterations)
        ));
    }

    #[tokio::test]
    async fn no_tasks_is_an_error() {
        let engine = StandaloneEngine::from_options(EngineOptions::default())
            .unwrap_or_else(|e| panic!("expected valid engine: {e}"));
        assert!(matches!(engine.run(vec![]).await, Err(Error::NoScenarios)));
    }

    #[tokio::test(start_paused = true)]
    async fn iterations_are_split_by_weight() {
        let sink = Arc::new(RecordingSink::default());
        let engine = StandaloneEngine::from_options(EngineOptions {
            workers: Some(2),
            iterations: Some(8),
            duration: None,
        })
        .unwrap_or_else(|e| panic!("expected valid engine: {e}"));

        let summary = engine
            .run(vec![task("heavy", 3, sink.clone()), task("light", 1, sink.clone())])
            .await
            .unwrap_or_else(|e| panic!("expected run to succeed: {e}"));

        assert_eq!(summary.iterations_total, 8);
        assert_eq!(summary.iterations_failed, 0);
        assert_eq!(sink.transactions_named(WHOLE_RUN_TRANSACTION).len(), 8);
        assert_eq!(
            sink.events()
                .iter()
                .filter(|e| matches!(e, crate::sink::SinkEvent::Success { .. }))
                .count(),
            8
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duration_mode_stops_at_deadline() {
        let sink = Arc::new(RecordingSink::default());
        let engine = StandaloneEngine::from_options(EngineOptions {
            workers: Some(1),
            iterations: None,
            duration: Some(ConfigDuration::from(Duration::from_millis(95))),
        })
        .unwrap_or_else(|e| panic!("expected valid engine: {e}"));

        let summary = engine
            .run(vec![task("loop", 1, sink.clone())])
            .await
            .unwrap_or_else(|e| panic!("expected run to succeed: {e}"));

        // Runs start at 0, 10, ..., 90 ms.
        assert_eq!(summary.iterations_total, 10);
        assert_eq!(summary.elapsed, Duration::from_millis(100));
    }
}
