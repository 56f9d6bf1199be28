use crate::params::ParameterError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("scenario name must not be empty")]
    EmptyScenarioName,

    #[error("scenario `{scenario}`: `weight` must be a positive integer")]
    InvalidWeight { scenario: String },

    #[error("scenario `{scenario}` has no steps")]
    NoSteps { scenario: String },

    #[error("scenario `{scenario}`: {source}")]
    Parameters {
        scenario: String,
        #[source]
        source: ParameterError,
    },

    #[error("no scenarios to run")]
    NoScenarios,

    #[error("`workers` must be a positive integer")]
    InvalidWorkers,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,
}
