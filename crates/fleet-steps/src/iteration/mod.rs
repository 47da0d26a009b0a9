//! Step de iteración de recursos: crea, verifica y borra un resource group
//! `Iterations` veces, con circuit breaker por fallos consecutivos.
//!
//! ```text
//! (none) ──deploy──▶ Creating ──ok──▶ Created ──delete──▶ Deleting ──ok──▶ Deleted ──▶ next / Succeeded
//!                       │                                     │
//!                       └─fail─▶ CreationFailed ──delete──▶   └─fail─▶ DeletionFailed ──▶ next
//! ```

mod cycle;
mod disk_sku;
mod parameters;
mod spec_builder;
mod state;

use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::{Clock, DependencyRegistry, ResumableStep, StepContext, StepError, StepParameters, StepResult,
                 SystemClock, TickContext};
use fleet_providers::{FileSystem, LocalFileSystem, ProvisioningClient, SessionClient};

pub use disk_sku::{effective_disk_sku, is_premium_capable, DEFAULT_OS_DISK_SKU};
pub use parameters::{IterationParameters, Placement};
pub use spec_builder::{build_spec, choose_vm_sku, resource_group_name};
pub use state::{ActiveIterationState, IterationState};

pub const STEP_NAME: &str = "resource-iteration";

#[derive(Debug, Default)]
pub struct ResourceIterationStep;

impl ResourceIterationStep {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResumableStep for ResourceIterationStep {
    type State = IterationState;

    fn name(&self) -> &str {
        STEP_NAME
    }

    fn validate_parameters(&self, parameters: &StepParameters) -> Result<(), StepError> {
        IterationParameters::from_parameters(parameters).map(|_| ())
    }

    /// Los clientes de aprovisionamiento y de sesiones no tienen implementación
    /// por defecto; el host los registra antes del primer tick.
    fn configure_dependencies(&self,
                              registry: &DependencyRegistry,
                              _context: &StepContext,
                              parameters: &StepParameters)
                              -> Result<(), StepError> {
        registry.register_with(|| Arc::new(LocalFileSystem) as Arc<dyn FileSystem>);
        registry.register_with(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        if !registry.contains::<Arc<dyn ProvisioningClient>>() {
            return Err(StepError::Configuration("no provisioning client registered".into()));
        }
        let uses_session = IterationParameters::from_parameters(parameters)?.uses_reserved_session();
        if uses_session && !registry.contains::<Arc<dyn SessionClient>>() {
            return Err(StepError::Configuration("no reserved-session client registered".into()));
        }
        Ok(())
    }

    fn initial_state(&self, tick: &TickContext<'_>) -> Result<IterationState, StepError> {
        let parameters = IterationParameters::from_parameters(tick.parameters)?;
        Ok(IterationState::new(parameters.maximum_consecutive_failure))
    }

    async fn execute_tick(&self, tick: &TickContext<'_>, state: &mut IterationState) -> Result<StepResult, StepError> {
        let parameters = IterationParameters::from_parameters(tick.parameters)?;
        let client = tick.dependencies.resolve::<Arc<dyn ProvisioningClient>>()?;
        state.maximum_consecutive_failure = parameters.maximum_consecutive_failure;

        let phase = state.active_iteration_state;
        let between_iterations = phase.map_or(true, |p| p.is_finished());
        if between_iterations && state.successes() >= parameters.iterations {
            return Ok(StepResult::succeeded());
        }
        if tick.is_cancelled() {
            return Ok(StepResult::in_progress());
        }

        match phase {
            Some(ActiveIterationState::Creating) => cycle::refresh_creation(tick, &parameters, client.as_ref(), state).await,
            Some(ActiveIterationState::Created) | Some(ActiveIterationState::CreationFailed) => {
                cycle::begin_deletion(tick, &parameters, client.as_ref(), state).await
            }
            Some(ActiveIterationState::Deleting) => cycle::refresh_deletion(tick, &parameters, client.as_ref(), state).await,
            _ => cycle::begin_iteration(tick, &parameters, client.as_ref(), state).await,
        }
    }
}
