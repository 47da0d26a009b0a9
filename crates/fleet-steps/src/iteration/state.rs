use fleet_core::Deadline;
use fleet_providers::ResourceGroupSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveIterationState {
    Creating,
    Created,
    Deleting,
    Deleted,
    CreationFailed,
    DeletionFailed,
}

impl ActiveIterationState {
    /// El grupo de la iteración ya no está (o se dio por perdido); puede empezar
    /// otra.
    pub fn is_finished(&self) -> bool {
        matches!(self, ActiveIterationState::Deleted | ActiveIterationState::DeletionFailed)
    }
}

/// Se persiste entre ticks del step de iteración. Como mucho un grupo activo
/// a la vez.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationState {
    /// Iteraciones comenzadas hasta ahora.
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub active_iteration_resource_group: Option<ResourceGroupSpec>,
    #[serde(default)]
    pub active_iteration_state: Option<ActiveIterationState>,
    /// Deadline de la fase actual de creación o borrado.
    #[serde(default)]
    pub active_iteration_deadline: Option<Deadline>,
    /// Identificador registrado en `successful_iterations` para el grupo activo.
    #[serde(default)]
    pub active_resource_id: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    pub maximum_consecutive_failure: u32,
    #[serde(default)]
    pub successful_iterations: Vec<String>,
}

impl IterationState {
    pub fn new(maximum_consecutive_failure: u32) -> Self {
        Self { maximum_consecutive_failure,
               ..Self::default() }
    }

    pub fn successes(&self) -> u32 {
        u32::try_from(self.successful_iterations.len()).unwrap_or(u32::MAX)
    }
}
