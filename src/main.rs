use std::sync::Arc;

use fleet_core::{CancellationToken, DependencyRegistry, InMemoryStateStore, Step, StepContext, StepParameters,
                 StepStatus, TelemetryContext, TickRunner};
use fleet_persistence::{build_pool_from_env, PgStateStore};
use fleet_steps::WorkerProcessStep;
use fleetflow::{run_until_terminal, FleetError, PollOutcome, RunnerConfig};
use log::{info, warn};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const USAGE: &str = "usage: fleetflow <parameters.json> [--experiment <UUID>] [--step <ID>]";

#[derive(Serialize)]
struct RunSummary<'a> {
    experiment_id: Uuid,
    step_id: &'a str,
    #[serde(flatten)]
    outcome: &'a PollOutcome,
}

struct Args {
    parameters_path: String,
    experiment_id: Uuid,
    step_id: String,
}

fn parse_args(args: &[String]) -> Option<Args> {
    let parameters_path = args.get(1).filter(|a| !a.starts_with("--"))?.clone();
    let mut experiment_id = None;
    let mut step_id = None;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--experiment" => {
                i += 1;
                experiment_id = Some(Uuid::parse_str(args.get(i)?).ok()?);
            }
            "--step" => {
                i += 1;
                step_id = Some(args.get(i)?.clone());
            }
            _ => return None,
        }
        i += 1;
    }
    Some(Args { parameters_path,
                experiment_id: experiment_id.unwrap_or_else(Uuid::new_v4),
                step_id: step_id.unwrap_or_else(|| "worker".to_string()) })
}

fn read_parameters(path: &str) -> Result<StepParameters, FleetError> {
    let unreadable = |reason: String| FleetError::ParametersFile { path: path.to_string(),
                                                                   reason };
    let raw = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    let json = serde_json::from_str(&raw).map_err(|e| unreadable(e.to_string()))?;
    Ok(StepParameters::from_json(json)?)
}

async fn drive(step: &dyn Step,
               args: &Args,
               parameters: &StepParameters,
               config: &RunnerConfig,
               cancellation: &CancellationToken)
               -> Result<PollOutcome, FleetError> {
    let context = StepContext::new(args.experiment_id, args.step_id.clone());
    step.configure_dependencies(&context, parameters)?;
    let telemetry = TelemetryContext::for_step(&context);
    Ok(run_until_terminal(step,
                          &context,
                          parameters,
                          &telemetry,
                          cancellation,
                          config.poll_interval,
                          config.max_ticks).await)
}

async fn run(args: &Args, cancellation: &CancellationToken) -> Result<PollOutcome, FleetError> {
    let config = RunnerConfig::from_env()?;
    let parameters = read_parameters(&args.parameters_path)?;
    let registry = Arc::new(DependencyRegistry::new());

    match &config.database_url {
        Some(_) => {
            let pool = build_pool_from_env()?;
            info!("fleetflow:store backend=postgres");
            let runner = TickRunner::new(WorkerProcessStep::new(), PgStateStore::from_pool(pool), registry);
            drive(&runner, args, &parameters, &config, cancellation).await
        }
        None => {
            warn!("fleetflow:store backend=memory (state does not survive this process)");
            let runner = TickRunner::new(WorkerProcessStep::new(), InMemoryStateStore::new(), registry);
            drive(&runner, args, &parameters, &config, cancellation).await
        }
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let raw: Vec<String> = std::env::args().collect();
    let Some(args) = parse_args(&raw) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let cancellation = CancellationToken::new();
    let on_signal = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("fleetflow:interrupt cancelling");
            on_signal.cancel();
        }
    });

    match run(&args, &cancellation).await {
        Ok(outcome) => {
            let summary = RunSummary { experiment_id: args.experiment_id,
                                       step_id: &args.step_id,
                                       outcome: &outcome };
            match serde_json::to_string_pretty(&summary) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("[fleetflow] cannot render summary: {e}"),
            }
            let code = if outcome.result.status() == StepStatus::Succeeded { 0 } else { 1 };
            std::process::exit(code);
        }
        Err(e) => {
            eprintln!("[fleetflow] {e}");
            std::process::exit(3);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn parses_optional_identity() {
        let id = "6f1c2a7e-0000-4000-8000-000000000001";
        let args = parse_args(&argv(&["fleetflow", "p.json", "--experiment", id, "--step", "load"])).unwrap();
        assert_eq!(args.parameters_path, "p.json");
        assert_eq!(args.experiment_id.to_string(), id);
        assert_eq!(args.step_id, "load");
    }

    #[test]
    fn rejects_missing_path_and_unknown_flags() {
        assert!(parse_args(&argv(&["fleetflow"])).is_none());
        assert!(parse_args(&argv(&["fleetflow", "--step", "x"])).is_none());
        assert!(parse_args(&argv(&["fleetflow", "p.json", "--verbose"])).is_none());
        assert!(parse_args(&argv(&["fleetflow", "p.json", "--experiment", "nope"])).is_none());
    }
}
