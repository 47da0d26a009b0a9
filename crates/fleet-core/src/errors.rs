//! Errores del motor de steps.
//!
//! `StepError` es lo que devuelve un tick cuando no puede producir un
//! resultado no terminal. La frontera del tick (`TickRunner`) convierte todo
//! `StepError` en un `StepResult` `Failed` con `StepError::kind()` y el mensaje.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tipo de error estable y serializable expuesto en un `StepResult` fallido.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Configuration,
    Timeout,
    RestartLimitExceeded,
    MaximumFailuresReached,
    Process,
    Provider,
    StateStore,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RestartLimitExceeded => "restart_limit_exceeded",
            ErrorKind::MaximumFailuresReached => "maximum_failures_reached",
            ErrorKind::Process => "process",
            ErrorKind::Provider => "provider",
            ErrorKind::StateStore => "state_store",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errores de los backends de estado.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateStoreError {
    #[error("state serialization failed: {0}")]
    Serialization(String),
    #[error("state backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("dependency not found at '{path}' before deadline {deadline}")]
    DependencyNotFound { path: String, deadline: DateTime<Utc> },
    #[error("{milestone} not reached before deadline {deadline}")]
    Timeout { milestone: String, deadline: DateTime<Utc> },
    #[error("process '{name}' restarted too many times ({restarts} of maximum {maximum})")]
    RestartLimitExceeded { name: String, restarts: u32, maximum: u32 },
    #[error("maximum failures reached ({failures} consecutive of maximum {maximum})")]
    MaximumFailuresReached { failures: u32, maximum: u32 },
    #[error("process error: {0}")]
    Process(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error(transparent)]
    StateStore(#[from] StateStoreError),
    #[error("internal: {0}")]
    Internal(String),
}

impl StepError {
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        StepError::InvalidParameter { name: name.into(),
                                      reason: reason.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::MissingParameter(_) | StepError::InvalidParameter { .. } | StepError::Configuration(_) => {
                ErrorKind::Configuration
            }
            StepError::DependencyNotFound { .. } | StepError::Timeout { .. } => ErrorKind::Timeout,
            StepError::RestartLimitExceeded { .. } => ErrorKind::RestartLimitExceeded,
            StepError::MaximumFailuresReached { .. } => ErrorKind::MaximumFailuresReached,
            StepError::Process(_) => ErrorKind::Process,
            StepError::Provider(_) => ErrorKind::Provider,
            StepError::StateStore(_) => ErrorKind::StateStore,
            StepError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Clasificación gruesa para logs y alertas: "atascado", "roto" o "reintentar".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Timeout,
    Transient,
    Permanent,
}

pub fn classify_error(error: &StepError) -> ErrorClass {
    match error.kind() {
        ErrorKind::Configuration => ErrorClass::Configuration,
        ErrorKind::Timeout => ErrorClass::Timeout,
        ErrorKind::StateStore | ErrorKind::Provider => ErrorClass::Transient,
        ErrorKind::RestartLimitExceeded
        | ErrorKind::MaximumFailuresReached
        | ErrorKind::Process
        | ErrorKind::Internal => ErrorClass::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_not_found_is_a_timeout() {
        let err = StepError::DependencyNotFound { path: "/opt/worker".into(),
                                                  deadline: Utc::now() };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(classify_error(&err), ErrorClass::Timeout);
        assert!(err.to_string().contains("dependency not found"));
    }

    #[test]
    fn configuration_errors_share_a_kind() {
        for err in [StepError::MissingParameter("Duration".into()),
                    StepError::invalid_parameter("VmCount", "must be positive"),
                    StepError::Configuration("both set".into())]
        {
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
    }

    #[test]
    fn state_store_errors_convert() {
        let err: StepError = StateStoreError::Backend("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::StateStore);
        assert_eq!(classify_error(&err), ErrorClass::Transient);
    }
}
