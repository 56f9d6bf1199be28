mod error;
mod transaction;

pub mod config;
pub mod engine;
pub mod gate;
pub mod notify;
pub mod params;
pub mod sink;
pub mod step;
pub mod task;

pub use config::{
    ConfigDuration, EngineOptions, ScenarioConfig, ScenarioDefinition, ScenarioOptions,
    scenario_from_options,
};
pub use engine::{Engine, EngineSummary, StandaloneEngine};
pub use error::{Error, Result};
pub use load_test::LoadTest;
pub use notify::{
    ChannelNotifier, EventTracking, NoopNotifier, Notifier, NotifyError, TrackingEvent,
    notify_detached,
};
pub use params::{
    Limit, LimitSetting, ParameterError, ParameterIterator, ParametersSetting, Strategy,
};
pub use sink::{RecordingSink, Report, ResultSink, SinkEvent, StatsSink, TracingSink};
pub use step::{
    Boundary, FailureCause, FnExecutor, Step, StepContext, StepError, StepExecutor, StepFailure,
    StepInput, StepKind, StepOutcome, StepReport, StepRunner, from_fn,
};
pub use task::{InstanceReport, ScenarioTask, WHOLE_RUN_TRANSACTION};
pub use transaction::{TransactionError, TransactionTracker, UnclosedTransaction};

pub use loadcase_value::{Value, Variables};
