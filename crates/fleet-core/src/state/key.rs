use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Qué guarda un blob persistido de una instancia de step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateScope {
    /// Estado propio del controlador; se descarta cuando el step es terminal.
    State,
    /// Último `StepResult` devuelto por el tick runner.
    Result,
}

impl StateScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateScope::State => "state",
            StateScope::Result => "result",
        }
    }
}

/// `(experiment id, step id, scope)`. El estado nunca se comparte entre steps
/// ni experimentos.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub experiment_id: Uuid,
    pub step_id: String,
    pub scope: StateScope,
}

impl StateKey {
    pub fn new(experiment_id: Uuid, step_id: &str, scope: StateScope) -> Self {
        Self { experiment_id,
               step_id: step_id.to_string(),
               scope }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.experiment_id, self.step_id, self.scope.as_str())
    }
}
