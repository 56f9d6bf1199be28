use std::sync::Arc;
use std::time::Duration;

use loadcase_value::Variables;
use tokio::time::Instant;

use crate::config::ScenarioConfig;
use crate::sink::ResultSink;
use crate::step::{Boundary, StepFailure, StepKind, StepOutcome, StepRunner};
use crate::transaction::{TransactionTracker, millis};

/// Name of the synthetic transaction covering a whole run.
pub const WHOLE_RUN_TRANSACTION: &str = "Action";

/// What one run of a scenario amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceReport {
    pub success: bool,
    /// The run stopped early because of failfast.
    pub aborted: bool,
    pub steps_executed: usize,
    pub elapsed: Duration,
}

/// Mutable state private to one run.
#[derive(Debug)]
struct Instance {
    variables: Variables,
    transactions: TransactionTracker,
    started: Instant,
}

impl Instance {
    fn init(config: &ScenarioConfig) -> Self {
        let variables = config.instance_variables();
        Self {
            variables,
            transactions: TransactionTracker::default(),
            started: Instant::now(),
        }
    }

    /// Fold a step outcome into run state. Transaction boundaries are resolved here; an end
    /// boundary gets its elapsed time from the matching start.
    fn apply(&mut self, mut outcome: StepOutcome) -> Result<StepOutcome, StepFailure> {
        match outcome.kind {
            StepKind::Transaction(Boundary::Start) => {
                self.transactions
                    .open(&outcome.name, outcome.finished_at)
                    .map_err(|err| StepFailure::new(err, None))?;
            }
            StepKind::Transaction(Boundary::End) => {
                outcome.elapsed_ms = self
                    .transactions
                    .close(&outcome.name, outcome.finished_at)
                    .map_err(|err| StepFailure::new(err, None))?;
            }
            StepKind::Ordinary => {
                for (k, v) in outcome.exports.drain() {
                    self.variables.insert(k, v);
                }
            }
            StepKind::Rendezvous => {}
        }
        Ok(outcome)
    }
}

/// The executable unit for one scenario. Each [`run`](Self::run) is one independent
/// execution; any number may run concurrently.
pub struct ScenarioTask {
    config: Arc<ScenarioConfig>,
    sink: Arc<dyn ResultSink>,
    failfast: bool,
    debug: bool,
}

impl ScenarioTask {
    #[must_use]
    pub fn new(config: Arc<ScenarioConfig>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            config,
            sink,
            failfast: true,
            debug: false,
        }
    }

    #[must_use]
    pub fn with_failfast(mut self, failfast: bool) -> Self {
        self.failfast = failfast;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn weight(&self) -> u32 {
        self.config.weight
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ScenarioConfig> {
        &self.config
    }

    pub async fn run(&self) -> InstanceReport {
        let config = self.config.as_ref();
        let mut instance = Instance::init(config);
        let runner = StepRunner::new(config, self.debug);

        let mut scenario_success = true;
        let mut transaction_success = true;
        let mut steps_executed = 0usize;
        let mut aborted = false;

        for (index, step) in config.steps.iter().enumerate() {
            steps_executed += 1;

            let result = match runner.run(index, &instance.variables).await {
                Ok(outcome) => instance.apply(outcome),
                Err(failure) => Err(failure),
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(failure) => {
                    let error = failure.to_string();
                    self.sink.record_failure(
                        step.type_label(),
                        step.name(),
                        failure.elapsed_ms(),
                        &error,
                    );

                    scenario_success = false;
                    transaction_success = false;

                    if self.failfast {
                        tracing::error!(
                            scenario = %config.name,
                            step = step.name(),
                            index,
                            error = %error,
                            "abort running due to failfast setting"
                        );
                        aborted = true;
                        break;
                    }
                    tracing::warn!(
                        scenario = %config.name,
                        step = step.name(),
                        index,
                        error = %error,
                        "run step failed, continue next step"
                    );
                    continue;
                }
            };

            if self.debug {
                tracing::debug!(
                    scenario = %config.name,
                    step = step.name(),
                    index,
                    elapsed_ms = outcome.elapsed_ms,
                    "step finished"
                );
            }

            match outcome.kind {
                StepKind::Transaction(Boundary::End) => {
                    self.sink.record_transaction(
                        &outcome.name,
                        transaction_success,
                        outcome.elapsed_ms,
                        0,
                    );
                    transaction_success = true;
                }
                // Opening boundaries are reported when they close or at the end of the run.
                StepKind::Transaction(Boundary::Start) => {}
                // TODO: block on a shared barrier once rendezvous thresholds are configurable.
                StepKind::Rendezvous => {}
                StepKind::Ordinary => {
                    self.sink.record_success(
                        step.type_label(),
                        step.name(),
                        outcome.elapsed_ms,
                        outcome.content_size,
                    );
                }
            }
        }

        let ended = Instant::now();
        let Instance {
            transactions,
            started,
            ..
        } = instance;

        for open in transactions.sweep_unclosed(ended) {
            self.sink
                .record_transaction(&open.name, transaction_success, open.duration_ms, 0);
        }

        let elapsed = ended.saturating_duration_since(started);
        self.sink.record_transaction(
            WHOLE_RUN_TRANSACTION,
            scenario_success,
            millis(elapsed),
            0,
        );

        InstanceReport {
            success: scenario_success,
            aborted,
            steps_executed,
            elapsed,
        }
    }
}

impl std::fmt::Debug for ScenarioTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioTask")
            .field("name", &self.config.name)
            .field("weight", &self.config.weight)
            .field("failfast", &self.failfast)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}
