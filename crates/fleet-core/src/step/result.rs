use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::StepStatus;
use crate::errors::{ErrorKind, StepError};

/// Error estructurado que acompaña a un resultado `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&StepError> for StepFailure {
    fn from(err: &StepError) -> Self {
        Self { kind: err.kind(),
               message: err.to_string() }
    }
}

/// Valor devuelto por cada tick.
///
/// Solo `Failed` lleva error; los constructores son la única forma de armar
/// uno, así que la invariante vale para todo valor del programa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extension_timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<StepFailure>,
}

impl StepResult {
    fn of(status: StepStatus) -> Self {
        Self { status,
               extension_timeout: None,
               error: None }
    }

    pub fn in_progress() -> Self {
        Self::of(StepStatus::InProgress)
    }

    pub fn in_progress_continue() -> Self {
        Self::of(StepStatus::InProgressContinue)
    }

    pub fn succeeded() -> Self {
        Self::of(StepStatus::Succeeded)
    }

    pub fn cancelled() -> Self {
        Self::of(StepStatus::Cancelled)
    }

    pub fn system_cancelled() -> Self {
        Self::of(StepStatus::SystemCancelled)
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { status: StepStatus::Failed,
               extension_timeout: None,
               error: Some(StepFailure { kind,
                                         message: message.into() }) }
    }

    pub fn from_error(err: &StepError) -> Self {
        Self { status: StepStatus::Failed,
               extension_timeout: None,
               error: Some(StepFailure::from(err)) }
    }

    /// Pide al scheduler extender el deadline global del step en `extension`
    /// antes del próximo tick. Se ignora en resultados terminales.
    pub fn with_extension(mut self, extension: Duration) -> Self {
        if !self.status.is_terminal() {
            self.extension_timeout = Some(extension);
        }
        self
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn extension_timeout(&self) -> Option<Duration> {
        self.extension_timeout
    }

    pub fn error(&self) -> Option<&StepFailure> {
        self.error.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
