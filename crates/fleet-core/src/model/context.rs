use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{StateKey, StateScope};

/// Identidad de una instancia de step dentro de un experimento. Es la clave
/// de todo el estado persistido del step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepContext {
    pub experiment_id: Uuid,
    pub step_id: String,
}

impl StepContext {
    pub fn new(experiment_id: Uuid, step_id: impl Into<String>) -> Self {
        Self { experiment_id,
               step_id: step_id.into() }
    }

    pub fn state_key(&self) -> StateKey {
        StateKey::new(self.experiment_id, &self.step_id, StateScope::State)
    }

    pub fn result_key(&self) -> StateKey {
        StateKey::new(self.experiment_id, &self.step_id, StateScope::Result)
    }
}
