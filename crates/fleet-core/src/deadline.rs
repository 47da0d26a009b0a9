//! Deadlines absolutos persistidos en el estado del step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StepError;

/// Deadline UTC absoluto. Se persiste tal cual para sobrevivir reinicios del
/// orquestador; nunca se recalcula desde la hora actual una vez creado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deadline(DateTime<Utc>);

impl Deadline {
    pub fn after(now: DateTime<Utc>, timeout: std::time::Duration) -> Self {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        Self(now.checked_add_signed(timeout).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.0
    }

    /// `Err(StepError::Timeout)` con el hito que no se alcanzó.
    pub fn ensure_not_expired(&self, now: DateTime<Utc>, milestone: &str) -> Result<(), StepError> {
        if self.is_expired(now) {
            return Err(StepError::Timeout { milestone: milestone.to_string(),
                                            deadline: self.0 });
        }
        Ok(())
    }
}
