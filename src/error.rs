use fleet_core::StepError;
use fleet_persistence::PersistenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("configuration: {0}")]
    Config(String),
    #[error("cannot read parameters file '{path}': {reason}")]
    ParametersFile { path: String, reason: String },
    #[error(transparent)]
    Step(#[from] StepError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
