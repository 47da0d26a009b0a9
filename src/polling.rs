//! Maneja un step como lo hace el scheduler de la flota: un tick por
//! intervalo hasta que el step informa un estado terminal.

use std::time::Duration;

use fleet_core::{CancellationToken, Step, StepContext, StepParameters, StepResult, TelemetryContext};
use log::{debug, info};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Terminal,
    Cancelled,
    TickLimit,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub result: StepResult,
    pub ticks: u64,
    pub stopped: StopReason,
}

/// Tickea `step` cada `interval` hasta un resultado terminal, la cancelación
/// o `max_ticks`. Con el token cancelado igual se hace un tick para que el
/// step devuelva su último resultado persistido.
pub async fn run_until_terminal(step: &dyn Step,
                                context: &StepContext,
                                parameters: &StepParameters,
                                telemetry: &TelemetryContext,
                                cancellation: &CancellationToken,
                                interval: Duration,
                                max_ticks: Option<u64>)
                                -> PollOutcome {
    let mut ticks = 0u64;
    loop {
        ticks += 1;
        let tick_telemetry = telemetry.clone().with("tick", ticks);
        let result = step.execute(context, parameters, &tick_telemetry, cancellation).await;

        let stopped = if result.is_terminal() {
            Some(StopReason::Terminal)
        } else if cancellation.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if max_ticks.is_some_and(|max| ticks >= max) {
            Some(StopReason::TickLimit)
        } else {
            None
        };
        if let Some(stopped) = stopped {
            info!("poll:stop reason={stopped:?} ticks={ticks} status={:?} {telemetry}", result.status());
            return PollOutcome { result,
                                 ticks,
                                 stopped };
        }

        debug!("poll:sleep ms={} status={:?} {tick_telemetry}", interval.as_millis(), result.status());
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancellation.cancelled() => {}
        }
    }
}
