use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;

use super::StepResult;
use crate::clock::Clock;
use crate::dependencies::DependencyRegistry;
use crate::errors::StepError;
use crate::model::{StepContext, StepParameters, TelemetryContext};

/// Todo lo que ve un tick.
pub struct TickContext<'a> {
    pub context: &'a StepContext,
    pub parameters: &'a StepParameters,
    pub telemetry: &'a TelemetryContext,
    pub cancellation: &'a CancellationToken,
    pub dependencies: &'a DependencyRegistry,
}

impl TickContext<'_> {
    /// Hora actual del `Clock` registrado, o del reloj del sistema.
    pub fn now(&self) -> DateTime<Utc> {
        match self.dependencies.get::<Arc<dyn Clock>>() {
            Some(clock) => clock.now(),
            None => Utc::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Contrato que implementa cada controlador concreto.
///
/// El controlador solo decide qué hace un tick con su estado; carga,
/// persistencia, cancelación y traducción de errores viven en `TickRunner`.
#[async_trait]
pub trait ResumableStep: Send + Sync + 'static {
    /// Se persiste entre ticks como JSON.
    type State: Serialize + DeserializeOwned + Debug + Send + Sync;

    fn name(&self) -> &str;

    /// Rechaza parámetros con los que el step nunca podría correr. Sin efectos
    /// secundarios.
    fn validate_parameters(&self, parameters: &StepParameters) -> Result<(), StepError>;

    /// Registra los singletons que necesita el step. Debe ser idempotente:
    /// usar register-if-absent para que ganen los fakes registrados antes.
    fn configure_dependencies(&self,
                              registry: &DependencyRegistry,
                              context: &StepContext,
                              parameters: &StepParameters)
                              -> Result<(), StepError>;

    /// Estado de una instancia de step que nunca hizo un tick.
    fn initial_state(&self, tick: &TickContext<'_>) -> Result<Self::State, StepError>;

    /// Ejecuta como máximo una unidad de trabajo visible hacia afuera.
    async fn execute_tick(&self, tick: &TickContext<'_>, state: &mut Self::State) -> Result<StepResult, StepError>;
}

/// Vista object-safe del step, la que usa el scheduler.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    fn configure_dependencies(&self, context: &StepContext, parameters: &StepParameters) -> Result<(), StepError>;

    /// Un tick. Nunca falla: todo error se convierte en un resultado `Failed`.
    async fn execute(&self,
                     context: &StepContext,
                     parameters: &StepParameters,
                     telemetry: &TelemetryContext,
                     cancellation: &CancellationToken)
                     -> StepResult;
}
