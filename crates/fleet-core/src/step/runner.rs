//! Frontera del tick compartida por todos los controladores.
//!
//! Orden de un tick:
//! 1. Cancelado al entrar: devuelve el último resultado persistido (o
//!    `InProgress`).
//! 2. Ya hay un resultado terminal persistido: se devuelve sin hacer nada más.
//! 3. Validar parámetros, configurar dependencias una vez por instancia.
//! 4. Cargar el estado, o construir el inicial en el primer tick.
//! 5. Ejecutar el tick del controlador; un `Err` se vuelve `Failed`.
//! 6. Persistir el estado (no terminal) o descartarlo (terminal), y persistir
//!    el resultado.
//!
//! Un panic en cualquier punto de los pasos 3 a 6 se captura y se vuelve un
//! fallo `Internal`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use super::{ResumableStep, Step, StepResult, TickContext};
use crate::dependencies::DependencyRegistry;
use crate::errors::{classify_error, ErrorClass, ErrorKind, StepError};
use crate::model::{StepContext, StepParameters, TelemetryContext};
use crate::state::{StateStore, StateStoreExt};

pub struct TickRunner<T, S>
    where T: ResumableStep,
          S: StateStore
{
    step: T,
    store: S,
    dependencies: Arc<DependencyRegistry>,
    configured: DashSet<StepContext>,
}

impl<T, S> TickRunner<T, S>
    where T: ResumableStep,
          S: StateStore
{
    pub fn new(step: T, store: S, dependencies: Arc<DependencyRegistry>) -> Self {
        Self { step,
               store,
               dependencies,
               configured: DashSet::new() }
    }

    pub fn step(&self) -> &T {
        &self.step
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn dependencies(&self) -> &Arc<DependencyRegistry> {
        &self.dependencies
    }

    /// Último resultado persistido de una instancia, si se puede leer.
    pub fn last_result(&self, context: &StepContext) -> Option<StepResult> {
        match self.store.get_typed::<StepResult>(&context.result_key()) {
            Ok(result) => result,
            Err(e) => {
                warn!("tick:result-unreadable key={} err={e}", context.result_key());
                None
            }
        }
    }

    fn ensure_configured(&self, context: &StepContext, parameters: &StepParameters) -> Result<(), StepError> {
        if self.configured.contains(context) {
            return Ok(());
        }
        self.step.configure_dependencies(&self.dependencies, context, parameters)?;
        self.configured.insert(context.clone());
        debug!("tick:configured step={} key={}", self.step.name(), context.state_key());
        Ok(())
    }

    async fn run_tick(&self,
                      context: &StepContext,
                      parameters: &StepParameters,
                      telemetry: &TelemetryContext,
                      cancellation: &CancellationToken)
                      -> Result<StepResult, StepError> {
        self.step.validate_parameters(parameters)?;
        self.ensure_configured(context, parameters)?;

        let tick = TickContext { context,
                                 parameters,
                                 telemetry,
                                 cancellation,
                                 dependencies: &self.dependencies };
        let state_key = context.state_key();
        let mut state = match self.store.get_typed::<T::State>(&state_key)? {
            Some(state) => state,
            None => {
                debug!("tick:init-state {telemetry}");
                self.step.initial_state(&tick)?
            }
        };

        let result = match self.step.execute_tick(&tick, &mut state).await {
            Ok(result) => result,
            Err(e) => {
                log_error(&e, telemetry);
                StepResult::from_error(&e)
            }
        };

        if !result.is_terminal() {
            self.store.save_typed(&state_key, &state)?;
        }
        Ok(result)
    }

    fn finish(&self, context: &StepContext, result: &StepResult) {
        if result.is_terminal() {
            self.configured.remove(context);
            if let Err(e) = self.store.delete_state(&context.state_key()) {
                warn!("tick:state-discard-failed key={} err={e}", context.state_key());
            }
        }
        if let Err(e) = self.store.save_typed(&context.result_key(), result) {
            error!("tick:result-save-failed key={} err={e}", context.result_key());
        }
    }
}

fn log_error(e: &StepError, telemetry: &TelemetryContext) {
    match classify_error(e) {
        ErrorClass::Transient => warn!("tick:error kind={} class=transient err={e} {telemetry}", e.kind().as_str()),
        class => error!("tick:error kind={} class={class:?} err={e} {telemetry}", e.kind().as_str()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl<T, S> Step for TickRunner<T, S>
    where T: ResumableStep,
          S: StateStore
{
    fn name(&self) -> &str {
        self.step.name()
    }

    fn configure_dependencies(&self, context: &StepContext, parameters: &StepParameters) -> Result<(), StepError> {
        self.ensure_configured(context, parameters)
    }

    async fn execute(&self,
                     context: &StepContext,
                     parameters: &StepParameters,
                     telemetry: &TelemetryContext,
                     cancellation: &CancellationToken)
                     -> StepResult {
        let telemetry = telemetry.clone().with("step", self.step.name());

        if cancellation.is_cancelled() {
            let prior = self.last_result(context).unwrap_or_else(StepResult::in_progress);
            info!("tick:cancelled status={:?} {telemetry}", prior.status());
            return prior;
        }
        if let Some(prior) = self.last_result(context).filter(StepResult::is_terminal) {
            debug!("tick:already-terminal status={:?} {telemetry}", prior.status());
            return prior;
        }

        debug!("tick:start {telemetry}");
        let outcome = AssertUnwindSafe(self.run_tick(context, parameters, &telemetry, cancellation)).catch_unwind()
                                                                                                    .await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log_error(&e, &telemetry);
                StepResult::from_error(&e)
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                error!("tick:panic msg={message} {telemetry}");
                StepResult::failed(ErrorKind::Internal, format!("tick panicked: {message}"))
            }
        };
        self.finish(context, &result);
        info!("tick:end status={:?} {telemetry}", result.status());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryStateStore;
    use crate::StepStatus;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Ticks {
        count: u32,
    }

    #[derive(Default)]
    struct CountTo {
        target: u32,
        panic_at: Option<u32>,
        panic_on_init: bool,
        configure_calls: AtomicU32,
    }

    #[async_trait]
    impl ResumableStep for CountTo {
        type State = Ticks;

        fn name(&self) -> &str {
            "count-to"
        }

        fn validate_parameters(&self, parameters: &StepParameters) -> Result<(), StepError> {
            parameters.validate_required(&["Label"])
        }

        fn configure_dependencies(&self,
                                  _registry: &DependencyRegistry,
                                  _context: &StepContext,
                                  _parameters: &StepParameters)
                                  -> Result<(), StepError> {
            self.configure_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn initial_state(&self, _tick: &TickContext<'_>) -> Result<Ticks, StepError> {
            if self.panic_on_init {
                panic!("no initial state");
            }
            Ok(Ticks::default())
        }

        async fn execute_tick(&self, _tick: &TickContext<'_>, state: &mut Ticks) -> Result<StepResult, StepError> {
            state.count += 1;
            if self.panic_at == Some(state.count) {
                panic!("tick {} exploded", state.count);
            }
            if state.count >= self.target {
                Ok(StepResult::succeeded())
            } else {
                Ok(StepResult::in_progress())
            }
        }
    }

    fn runner(step: CountTo) -> TickRunner<CountTo, InMemoryStateStore> {
        TickRunner::new(step, InMemoryStateStore::new(), Arc::new(DependencyRegistry::new()))
    }

    fn params() -> StepParameters {
        StepParameters::new().with("Label", "x")
    }

    #[tokio::test]
    async fn configures_once_and_discards_state_on_terminal() {
        let runner = runner(CountTo { target: 2,
                                      ..Default::default() });
        let ctx = StepContext::new(Uuid::new_v4(), "s1");
        let token = CancellationToken::new();
        let telemetry = TelemetryContext::for_step(&ctx);

        let first = runner.execute(&ctx, &params(), &telemetry, &token).await;
        assert_eq!(first.status(), StepStatus::InProgress);
        assert!(runner.store().get_state(&ctx.state_key()).unwrap().is_some());

        let second = runner.execute(&ctx, &params(), &telemetry, &token).await;
        assert_eq!(second.status(), StepStatus::Succeeded);
        assert!(runner.store().get_state(&ctx.state_key()).unwrap().is_none());
        assert_eq!(runner.step().configure_calls.load(Ordering::SeqCst), 1);

        // Re-ticking a finished step returns the stored result without work.
        let third = runner.execute(&ctx, &params(), &telemetry, &token).await;
        assert_eq!(third, second);
        assert!(runner.store().get_state(&ctx.state_key()).unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_parameter_fails_before_any_state_exists() {
        let runner = runner(CountTo { target: 5,
                                      ..Default::default() });
        let ctx = StepContext::new(Uuid::new_v4(), "s1");
        let result = runner.execute(&ctx, &StepParameters::new(), &TelemetryContext::new(), &CancellationToken::new())
                           .await;
        assert_eq!(result.status(), StepStatus::Failed);
        assert_eq!(result.error().unwrap().kind, ErrorKind::Configuration);
        assert!(runner.store().get_state(&ctx.state_key()).unwrap().is_none());
        assert_eq!(runner.step().configure_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panics_become_internal_failures() {
        let runner = runner(CountTo { target: 5,
                                      panic_at: Some(1),
                                      ..Default::default() });
        let ctx = StepContext::new(Uuid::new_v4(), "s1");
        let result = runner.execute(&ctx, &params(), &TelemetryContext::new(), &CancellationToken::new()).await;
        assert_eq!(result.status(), StepStatus::Failed);
        let failure = result.error().unwrap();
        assert_eq!(failure.kind, ErrorKind::Internal);
        assert!(failure.message.contains("tick 1 exploded"));
    }

    #[tokio::test]
    async fn panics_before_the_controller_tick_are_caught_too() {
        let runner = runner(CountTo { target: 5,
                                      panic_on_init: true,
                                      ..Default::default() });
        let ctx = StepContext::new(Uuid::new_v4(), "s1");
        let result = runner.execute(&ctx, &params(), &TelemetryContext::new(), &CancellationToken::new()).await;
        assert_eq!(result.status(), StepStatus::Failed);
        assert_eq!(result.error().unwrap().kind, ErrorKind::Internal);
        assert!(result.error().unwrap().message.contains("no initial state"));
        assert!(runner.store().get_state(&ctx.state_key()).unwrap().is_none());
        assert_eq!(runner.last_result(&ctx), Some(result));
    }

    #[tokio::test]
    async fn terminal_result_forgets_the_configured_instance() {
        let runner = runner(CountTo { target: 1,
                                      ..Default::default() });
        let ctx = StepContext::new(Uuid::new_v4(), "s1");
        let token = CancellationToken::new();
        runner.execute(&ctx, &params(), &TelemetryContext::new(), &token).await;
        assert!(!runner.configured.contains(&ctx));
        assert_eq!(runner.step().configure_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_tick_returns_prior_result_unchanged() {
        let runner = runner(CountTo { target: 5,
                                      ..Default::default() });
        let ctx = StepContext::new(Uuid::new_v4(), "s1");
        let live = CancellationToken::new();
        runner.execute(&ctx, &params(), &TelemetryContext::new(), &live).await;
        let before = runner.store().get_state(&ctx.state_key()).unwrap();

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let result = runner.execute(&ctx, &params(), &TelemetryContext::new(), &cancelled).await;
        assert_eq!(result.status(), StepStatus::InProgress);
        assert_eq!(runner.store().get_state(&ctx.state_key()).unwrap(), before);

        let fresh = StepContext::new(Uuid::new_v4(), "s2");
        let result = runner.execute(&fresh, &params(), &TelemetryContext::new(), &cancelled).await;
        assert_eq!(result.status(), StepStatus::InProgress);
        assert!(runner.store().get_state(&fresh.result_key()).unwrap().is_none());
    }
}
