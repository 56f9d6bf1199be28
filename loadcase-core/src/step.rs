use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use loadcase_value::{Value, Variables};
use tokio::time::Instant;

use crate::config::ScenarioConfig;
use crate::transaction::{TransactionError, millis};

/// Which end of a transaction a boundary step marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Boundary {
    Start,
    End,
}

/// Step category as seen by the scenario task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Ordinary,
    Transaction(Boundary),
    Rendezvous,
}

/// One node of a scenario's ordered step list.
#[derive(Clone)]
pub enum Step {
    Ordinary {
        name: Arc<str>,
        /// Report label for the step (`request`, `api`, `testcase`, ...).
        step_type: Arc<str>,
        executor: Arc<dyn StepExecutor>,
    },
    Transaction {
        name: Arc<str>,
        boundary: Boundary,
    },
    /// Synchronization point. Currently a no-op; runs never wait on each other here.
    Rendezvous { name: Arc<str> },
}

impl Step {
    pub fn ordinary(
        name: impl Into<Arc<str>>,
        step_type: impl Into<Arc<str>>,
        executor: impl StepExecutor + 'static,
    ) -> Self {
        Self::Ordinary {
            name: name.into(),
            step_type: step_type.into(),
            executor: Arc::new(executor),
        }
    }

    pub fn request(name: impl Into<Arc<str>>, executor: impl StepExecutor + 'static) -> Self {
        Self::ordinary(name, "request", executor)
    }

    pub fn transaction_start(name: impl Into<Arc<str>>) -> Self {
        Self::Transaction {
            name: name.into(),
            boundary: Boundary::Start,
        }
    }

    pub fn transaction_end(name: impl Into<Arc<str>>) -> Self {
        Self::Transaction {
            name: name.into(),
            boundary: Boundary::End,
        }
    }

    pub fn rendezvous(name: impl Into<Arc<str>>) -> Self {
        Self::Rendezvous { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Ordinary { name, .. }
            | Self::Transaction { name, .. }
            | Self::Rendezvous { name } => name,
        }
    }

    /// Label used for the `kind` of success/failure events.
    #[must_use]
    pub fn type_label(&self) -> &str {
        match self {
            Self::Ordinary { step_type, .. } => step_type,
            Self::Transaction { .. } => "transaction",
            Self::Rendezvous { .. } => "rendezvous",
        }
    }

    #[must_use]
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Ordinary { .. } => StepKind::Ordinary,
            Self::Transaction { boundary, .. } => StepKind::Transaction(*boundary),
            Self::Rendezvous { .. } => StepKind::Rendezvous,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinary {
                name, step_type, ..
            } => f
                .debug_struct("Ordinary")
                .field("name", name)
                .field("step_type", step_type)
                .finish_non_exhaustive(),
            Self::Transaction { name, boundary } => f
                .debug_struct("Transaction")
                .field("name", name)
                .field("boundary", boundary)
                .finish(),
            Self::Rendezvous { name } => f.debug_struct("Rendezvous").field("name", name).finish(),
        }
    }
}

/// What an executor sees of the run it is part of.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub index: usize,
    pub scenario: &'a str,
    pub variables: &'a Variables,
    /// Executors may log request/response content when set.
    pub debug: bool,
}

impl StepContext<'_> {
    #[must_use]
    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    #[must_use]
    pub fn to_input(&self) -> StepInput {
        StepInput {
            index: self.index,
            scenario: Arc::from(self.scenario),
            variables: self.variables.clone(),
            debug: self.debug,
        }
    }
}

/// Owned copy of a [`StepContext`], for executors built from closures.
#[derive(Debug, Clone)]
pub struct StepInput {
    pub index: usize,
    pub scenario: Arc<str>,
    pub variables: Variables,
    pub debug: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Bytes transferred; 0 when not applicable.
    pub content_size: i64,
    /// Variables made visible to the following steps of the same run.
    pub exports: Variables,
}

impl StepReport {
    #[must_use]
    pub fn with_content_size(mut self, content_size: i64) -> Self {
        self.content_size = content_size;
        self
    }

    #[must_use]
    pub fn export(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.exports.insert(Arc::from(key), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("{0}")]
    Other(String),
}

/// The opaque unit of work behind an ordinary step.
pub trait StepExecutor: Send + Sync {
    fn execute<'a>(&'a self, ctx: StepContext<'a>) -> BoxFuture<'a, Result<StepReport, StepError>>;
}

/// Executor backed by an async closure over an owned [`StepInput`].
pub struct FnExecutor<F> {
    f: F,
}

pub fn from_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(StepInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepReport, StepError>> + Send + 'static,
{
    FnExecutor { f }
}

impl<F, Fut> StepExecutor for FnExecutor<F>
where
    F: Fn(StepInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepReport, StepError>> + Send + 'static,
{
    fn execute<'a>(&'a self, ctx: StepContext<'a>) -> BoxFuture<'a, Result<StepReport, StepError>> {
        Box::pin((self.f)(ctx.to_input()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub kind: StepKind,
    pub name: Arc<str>,
    pub elapsed_ms: i64,
    pub content_size: i64,
    pub exports: Variables,
    pub finished_at: Instant,
}

#[derive(Debug, thiserror::Error)]
pub enum FailureCause {
    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("no step at index {0}")]
    MissingStep(usize),
}

/// A failed step: the cause plus whatever outcome was measured before it failed.
#[derive(Debug, thiserror::Error)]
#[error("{cause}")]
pub struct StepFailure {
    pub cause: FailureCause,
    pub outcome: Option<StepOutcome>,
}

impl StepFailure {
    #[must_use]
    pub fn new(cause: impl Into<FailureCause>, outcome: Option<StepOutcome>) -> Self {
        Self {
            cause: cause.into(),
            outcome,
        }
    }

    /// Elapsed time of the failed attempt; 0 when nothing was measured.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        self.outcome.as_ref().map_or(0, |o| o.elapsed_ms)
    }
}

/// Executes single steps of one scenario. Holds no per-run state.
#[derive(Debug, Clone, Copy)]
pub struct StepRunner<'a> {
    scenario: &'a ScenarioConfig,
    debug: bool,
}

impl<'a> StepRunner<'a> {
    #[must_use]
    pub fn new(scenario: &'a ScenarioConfig, debug: bool) -> Self {
        Self { scenario, debug }
    }

    pub async fn run(
        &self,
        index: usize,
        variables: &Variables,
    ) -> Result<StepOutcome, StepFailure> {
        let Some(step) = self.scenario.steps.get(index) else {
            return Err(StepFailure::new(FailureCause::MissingStep(index), None));
        };

        match step {
            Step::Ordinary {
                name, executor, ..
            } => {
                let ctx = StepContext {
                    index,
                    scenario: &self.scenario.name,
                    variables,
                    debug: self.debug,
                };

                let started = Instant::now();
                let result = executor.execute(ctx).await;
                let finished_at = Instant::now();
                let elapsed_ms = millis(finished_at.saturating_duration_since(started));

                match result {
                    Ok(report) => Ok(StepOutcome {
                        kind: StepKind::Ordinary,
                        name: name.clone(),
                        elapsed_ms,
                        content_size: report.content_size,
                        exports: report.exports,
                        finished_at,
                    }),
                    Err(err) => Err(StepFailure::new(
                        err,
                        Some(StepOutcome {
                            kind: StepKind::Ordinary,
                            name: name.clone(),
                            elapsed_ms,
                            content_size: 0,
                            exports: Variables::new(),
                            finished_at,
                        }),
                    )),
                }
            }
            Step::Transaction { name, .. } | Step::Rendezvous { name } => Ok(StepOutcome {
                kind: step.kind(),
                name: name.clone(),
                elapsed_ms: 0,
                content_size: 0,
                exports: Variables::new(),
                finished_at: Instant::now(),
            }),
        }
    }
}
