use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::{CancellationToken, DependencyRegistry, InMemoryStateStore, ResumableStep, StepContext, StepError,
                 StepParameters, StepResult, StepStatus, TelemetryContext, TickContext, TickRunner};
use fleetflow::{run_until_terminal, StopReason};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Progress {
    ticks: u32,
}

/// Succeeds on its `target`-th tick; cancels the token on `cancel_at`.
struct Countdown {
    target: u32,
    cancel_at: Option<(u32, CancellationToken)>,
    executed: AtomicU32,
}

impl Countdown {
    fn new(target: u32) -> Self {
        Self { target,
               cancel_at: None,
               executed: AtomicU32::new(0) }
    }
}

#[async_trait]
impl ResumableStep for Countdown {
    type State = Progress;

    fn name(&self) -> &str {
        "countdown"
    }

    fn validate_parameters(&self, _parameters: &StepParameters) -> Result<(), StepError> {
        Ok(())
    }

    fn configure_dependencies(&self,
                              _registry: &DependencyRegistry,
                              _context: &StepContext,
                              _parameters: &StepParameters)
                              -> Result<(), StepError> {
        Ok(())
    }

    fn initial_state(&self, _tick: &TickContext<'_>) -> Result<Progress, StepError> {
        Ok(Progress::default())
    }

    async fn execute_tick(&self, _tick: &TickContext<'_>, state: &mut Progress) -> Result<StepResult, StepError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        state.ticks += 1;
        if let Some((at, token)) = &self.cancel_at {
            if state.ticks == *at {
                token.cancel();
            }
        }
        if state.ticks >= self.target {
            Ok(StepResult::succeeded())
        } else {
            Ok(StepResult::in_progress())
        }
    }
}

fn runner(step: Countdown) -> TickRunner<Countdown, InMemoryStateStore> {
    TickRunner::new(step, InMemoryStateStore::new(), Arc::new(DependencyRegistry::new()))
}

#[tokio::test]
async fn runs_until_the_step_succeeds() {
    let runner = runner(Countdown::new(4));
    let ctx = StepContext::new(Uuid::new_v4(), "countdown");
    let outcome = run_until_terminal(&runner,
                                     &ctx,
                                     &StepParameters::new(),
                                     &TelemetryContext::for_step(&ctx),
                                     &CancellationToken::new(),
                                     Duration::from_millis(1),
                                     None).await;
    assert_eq!(outcome.stopped, StopReason::Terminal);
    assert_eq!(outcome.result.status(), StepStatus::Succeeded);
    assert_eq!(outcome.ticks, 4);
}

#[tokio::test]
async fn tick_limit_stops_early() {
    let runner = runner(Countdown::new(100));
    let ctx = StepContext::new(Uuid::new_v4(), "countdown");
    let outcome = run_until_terminal(&runner,
                                     &ctx,
                                     &StepParameters::new(),
                                     &TelemetryContext::new(),
                                     &CancellationToken::new(),
                                     Duration::from_millis(1),
                                     Some(3)).await;
    assert_eq!(outcome.stopped, StopReason::TickLimit);
    assert_eq!(outcome.result.status(), StepStatus::InProgress);
    assert_eq!(runner.step().executed.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cancellation_during_a_tick_stops_after_it() {
    let token = CancellationToken::new();
    let mut step = Countdown::new(100);
    step.cancel_at = Some((2, token.clone()));
    let runner = runner(step);
    let ctx = StepContext::new(Uuid::new_v4(), "countdown");

    let outcome = run_until_terminal(&runner,
                                     &ctx,
                                     &StepParameters::new(),
                                     &TelemetryContext::new(),
                                     &token,
                                     Duration::from_millis(1),
                                     None).await;
    assert_eq!(outcome.stopped, StopReason::Cancelled);
    assert_eq!(outcome.ticks, 2);
    assert_eq!(runner.step().executed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancellation_interrupts_the_wait() {
    let token = CancellationToken::new();
    let runner = runner(Countdown::new(100));
    let ctx = StepContext::new(Uuid::new_v4(), "countdown");

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });
    let params = StepParameters::new();
    let telemetry = TelemetryContext::new();
    let polling = run_until_terminal(&runner,
                                     &ctx,
                                     &params,
                                     &telemetry,
                                     &token,
                                     Duration::from_secs(3600),
                                     None);
    let outcome = tokio_test::assert_ok!(tokio::time::timeout(Duration::from_secs(5), polling).await);

    // The tick after the wake-up only reports the persisted result.
    assert_eq!(outcome.stopped, StopReason::Cancelled);
    assert_eq!(outcome.ticks, 2);
    assert_eq!(outcome.result.status(), StepStatus::InProgress);
    assert_eq!(runner.step().executed.load(Ordering::SeqCst), 1);
}
