//! Línea de comando del worker.
//!
//! Primero van los argumentos del llamador, luego la identidad del
//! experimento, la semilla determinista y, si está configurada, la connection
//! string de telemetría:
//!
//! ```text
//! <program> <Arguments...> --experiment-id=<uuid> --seed=<n> [--telemetry=<conn>]
//! ```

use std::path::Path;

use fleet_core::hashing::deterministic_seed;
use fleet_core::redact::obscure_secrets;
use fleet_core::{CancellationToken, StepError};
use fleet_providers::{SecretError, SecretResolver};
use uuid::Uuid;

use super::parameters::{ProcessParameters, TELEMETRY_CONNECTION_STRING};

/// Connection string de telemetría resuelta para un arranque, más cada valor
/// que nunca debe loguearse en claro.
#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub telemetry: Option<String>,
    pub secrets: Vec<String>,
}

/// Resuelve la connection string de telemetría si es una referencia a
/// secreto. `Ok(None)` indica que la resolución se canceló.
pub async fn resolve_secrets(parameters: &ProcessParameters,
                             resolver: &dyn SecretResolver,
                             cancellation: &CancellationToken)
                             -> Result<Option<ResolvedSecrets>, StepError> {
    let Some(raw) = parameters.telemetry_connection_string.as_deref() else {
        return Ok(Some(ResolvedSecrets::default()));
    };
    let value = if resolver.is_secret_reference(raw) {
        match resolver.resolve_secret(raw, cancellation).await {
            Ok(value) => value,
            Err(SecretError::Cancelled) => return Ok(None),
            Err(e) => return Err(StepError::invalid_parameter(TELEMETRY_CONNECTION_STRING, e.to_string())),
        }
    } else {
        raw.to_string()
    };
    Ok(Some(ResolvedSecrets { secrets: vec![value.clone()],
                              telemetry: Some(value) }))
}

pub fn build_arguments(parameters: &ProcessParameters, experiment_id: &Uuid, telemetry: Option<&str>) -> Vec<String> {
    let mut args = parameters.arguments.clone();
    args.push(format!("--experiment-id={experiment_id}"));
    args.push(format!("--seed={}", deterministic_seed(experiment_id)));
    if let Some(conn) = telemetry {
        args.push(format!("--telemetry={conn}"));
    }
    args
}

/// Línea de comando apta para logs, con los secretos ofuscados.
pub fn display_command(program: &Path, args: &[String], secrets: &[String]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    obscure_secrets(&line, secrets)
}
