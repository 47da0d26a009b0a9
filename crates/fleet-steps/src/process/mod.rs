//! Step de proceso worker: chequeo de instalación, arranque, monitoreo,
//! reinicio y parada de un proceso externo a lo largo de muchos ticks.
//!
//! Decisión por tick, en orden de prioridad:
//! 1. dependencias no verificadas: esperar el install path (deadline de setup);
//! 2. worker sin correr: arrancarlo (cuenta reinicios tras el primer arranque);
//! 3. worker supuestamente corriendo: re-adquirirlo y clasificar
//!    corriendo / duración vencida / caído / sobrevivió a un reinicio.

mod command;
mod lifecycle;
mod parameters;
mod state;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use fleet_core::{Clock, Deadline, DependencyRegistry, ResumableStep, StepContext, StepError, StepParameters, StepResult,
                 SystemClock, TickContext};
use fleet_providers::{EnvSecretResolver, FileSystem, LocalFileSystem, ProcessHandle, ProcessPlatform, SecretResolver,
                      SystemProcessPlatform};

pub use command::{build_arguments, display_command};
pub use parameters::ProcessParameters;
pub use state::ProcessState;

pub const STEP_NAME: &str = "worker-process";

/// Handles vivos que observó esta instancia del controlador, por instancia de
/// step. Es solo una caché: cada tick la valida contra el OS, y una caché
/// vacía (orquestador reiniciado) cae a búsquedas por pid/nombre. Se vacía
/// cuando el step llega a un resultado terminal.
#[derive(Debug, Default)]
pub struct WorkerProcessStep {
    handles: DashMap<StepContext, ProcessHandle>,
}

impl WorkerProcessStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked_handle(&self, context: &StepContext) -> Option<ProcessHandle> {
        self.handles.get(context).map(|h| h.value().clone())
    }
}

/// Colaboradores resueltos desde el registry para un tick.
pub(crate) struct Collaborators {
    pub platform: Arc<dyn ProcessPlatform>,
    pub resolver: Arc<dyn SecretResolver>,
}

#[async_trait]
impl ResumableStep for WorkerProcessStep {
    type State = ProcessState;

    fn name(&self) -> &str {
        STEP_NAME
    }

    fn validate_parameters(&self, parameters: &StepParameters) -> Result<(), StepError> {
        ProcessParameters::from_parameters(parameters).map(|_| ())
    }

    fn configure_dependencies(&self,
                              registry: &DependencyRegistry,
                              _context: &StepContext,
                              _parameters: &StepParameters)
                              -> Result<(), StepError> {
        registry.register_with(|| Arc::new(SystemProcessPlatform::new()) as Arc<dyn ProcessPlatform>);
        registry.register_with(|| Arc::new(LocalFileSystem) as Arc<dyn FileSystem>);
        registry.register_with(|| Arc::new(EnvSecretResolver) as Arc<dyn SecretResolver>);
        registry.register_with(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        Ok(())
    }

    fn initial_state(&self, tick: &TickContext<'_>) -> Result<ProcessState, StepError> {
        let parameters = ProcessParameters::from_parameters(tick.parameters)?;
        Ok(ProcessState::new(Deadline::after(tick.now(), parameters.timeout)))
    }

    async fn execute_tick(&self, tick: &TickContext<'_>, state: &mut ProcessState) -> Result<StepResult, StepError> {
        let outcome = self.advance(tick, state).await;
        if !matches!(&outcome, Ok(result) if !result.is_terminal()) {
            self.handles.remove(tick.context);
        }
        outcome
    }
}

impl WorkerProcessStep {
    async fn advance(&self, tick: &TickContext<'_>, state: &mut ProcessState) -> Result<StepResult, StepError> {
        let parameters = ProcessParameters::from_parameters(tick.parameters)?;
        let now = tick.now();

        if !state.dependencies_installed {
            let fs = tick.dependencies.resolve::<Arc<dyn FileSystem>>()?;
            return self.check_dependencies(tick, &parameters, fs.as_ref(), state, now).await;
        }

        let collaborators = Collaborators { platform: tick.dependencies.resolve::<Arc<dyn ProcessPlatform>>()?,
                                            resolver: tick.dependencies.resolve::<Arc<dyn SecretResolver>>()? };
        if !state.process_running {
            return self.start_worker(tick, &parameters, &collaborators, state, now).await;
        }
        self.monitor_worker(tick, &parameters, &collaborators, state, now).await
    }
}
