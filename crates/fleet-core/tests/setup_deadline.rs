//! Shared state-machine shape: a step that waits for a milestone and fails
//! with a timeout kind once its persisted deadline passes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fleet_core::{Clock, CancellationToken, Deadline, DependencyRegistry, ErrorKind, InMemoryStateStore, ManualClock,
                 ResumableStep, Step, StepContext, StepError, StepParameters, StepResult, StepStatus, TelemetryContext,
                 TickContext, TickRunner};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct WaitState {
    step_timeout: Deadline,
    ready: bool,
}

struct WaitForFlag {
    flag: Arc<std::sync::atomic::AtomicBool>,
}

#[async_trait]
impl ResumableStep for WaitForFlag {
    type State = WaitState;

    fn name(&self) -> &str {
        "wait-for-flag"
    }

    fn validate_parameters(&self, parameters: &StepParameters) -> Result<(), StepError> {
        parameters.require_duration("Timeout").map(|_| ())
    }

    fn configure_dependencies(&self,
                              registry: &DependencyRegistry,
                              _context: &StepContext,
                              _parameters: &StepParameters)
                              -> Result<(), StepError> {
        registry.register_with(|| Arc::new(fleet_core::SystemClock) as Arc<dyn Clock>);
        Ok(())
    }

    fn initial_state(&self, tick: &TickContext<'_>) -> Result<WaitState, StepError> {
        let timeout = tick.parameters.require_duration("Timeout")?;
        Ok(WaitState { step_timeout: Deadline::after(tick.now(), timeout),
                       ready: false })
    }

    async fn execute_tick(&self, tick: &TickContext<'_>, state: &mut WaitState) -> Result<StepResult, StepError> {
        if !state.ready {
            if self.flag.load(std::sync::atomic::Ordering::SeqCst) {
                state.ready = true;
                return Ok(StepResult::in_progress_continue());
            }
            state.step_timeout.ensure_not_expired(tick.now(), "flag")?;
            return Ok(StepResult::in_progress_continue());
        }
        Ok(StepResult::succeeded())
    }
}

fn setup() -> (TickRunner<WaitForFlag, InMemoryStateStore>, Arc<ManualClock>, Arc<std::sync::atomic::AtomicBool>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let registry = Arc::new(DependencyRegistry::new());
    registry.register::<Arc<dyn Clock>>(clock.clone());
    let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let runner = TickRunner::new(WaitForFlag { flag: flag.clone() }, InMemoryStateStore::new(), registry);
    (runner, clock, flag)
}

#[tokio::test]
async fn deadline_survives_ticks_and_fails_with_timeout_kind() {
    let (runner, clock, _flag) = setup();
    let ctx = StepContext::new(Uuid::new_v4(), "wait");
    let params = StepParameters::new().with("Timeout", "10m");
    let token = CancellationToken::new();
    let telemetry = TelemetryContext::for_step(&ctx);

    let r = runner.execute(&ctx, &params, &telemetry, &token).await;
    assert_eq!(r.status(), StepStatus::InProgressContinue);

    clock.advance(chrono::Duration::minutes(9));
    let r = runner.execute(&ctx, &params, &telemetry, &token).await;
    assert_eq!(r.status(), StepStatus::InProgressContinue);

    clock.advance(chrono::Duration::minutes(1));
    let r = runner.execute(&ctx, &params, &telemetry, &token).await;
    assert_eq!(r.status(), StepStatus::Failed);
    assert_eq!(r.error().map(|e| e.kind), Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn milestone_reached_before_deadline_completes() {
    let (runner, clock, flag) = setup();
    let ctx = StepContext::new(Uuid::new_v4(), "wait");
    let params = StepParameters::new().with("Timeout", "10m");
    let token = CancellationToken::new();
    let telemetry = TelemetryContext::new();

    runner.execute(&ctx, &params, &telemetry, &token).await;
    flag.store(true, std::sync::atomic::Ordering::SeqCst);
    let r = runner.execute(&ctx, &params, &telemetry, &token).await;
    assert_eq!(r.status(), StepStatus::InProgressContinue);

    // Past the deadline but the milestone flag is already persisted.
    clock.advance(chrono::Duration::hours(1));
    let r = runner.execute(&ctx, &params, &telemetry, &token).await;
    assert_eq!(r.status(), StepStatus::Succeeded);
}
