use std::path::{Path, PathBuf};
use std::time::Duration;

use fleet_core::constants::{DEFAULT_MAX_RESTARTS, DEFAULT_SETUP_TIMEOUT};
use fleet_core::{StepError, StepParameters};
use serde_json::Value;

pub const INSTALL_PATH: &str = "InstallPath";
pub const COMMAND: &str = "Command";
pub const ARGUMENTS: &str = "Arguments";
pub const DURATION: &str = "Duration";
pub const TIMEOUT: &str = "Timeout";
pub const MAX_RESTARTS: &str = "MaxRestarts";
pub const TELEMETRY_CONNECTION_STRING: &str = "TelemetryConnectionString";
pub const WORKING_DIRECTORY: &str = "WorkingDirectory";

/// Vista tipada de los parámetros del step de proceso worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessParameters {
    pub install_path: PathBuf,
    pub command: String,
    pub arguments: Vec<String>,
    pub duration: Duration,
    pub timeout: Duration,
    pub max_restarts: u32,
    pub telemetry_connection_string: Option<String>,
    pub working_directory: Option<PathBuf>,
}

impl ProcessParameters {
    pub fn from_parameters(parameters: &StepParameters) -> Result<Self, StepError> {
        parameters.validate_required(&[INSTALL_PATH, COMMAND, DURATION])?;
        let max_restarts = parameters.get_u32(MAX_RESTARTS)?.unwrap_or(DEFAULT_MAX_RESTARTS);
        if max_restarts == 0 {
            return Err(StepError::invalid_parameter(MAX_RESTARTS, "must be at least 1"));
        }
        let duration = parameters.require_duration(DURATION)?;
        if duration.is_zero() {
            return Err(StepError::invalid_parameter(DURATION, "must be positive"));
        }
        Ok(Self { install_path: PathBuf::from(parameters.require_string(INSTALL_PATH)?),
                  command: parameters.require_string(COMMAND)?,
                  arguments: arguments(parameters)?,
                  duration,
                  timeout: parameters.get_duration(TIMEOUT)?.unwrap_or(DEFAULT_SETUP_TIMEOUT),
                  max_restarts,
                  telemetry_connection_string: parameters.get_string(TELEMETRY_CONNECTION_STRING)?,
                  working_directory: parameters.get_string(WORKING_DIRECTORY)?.map(PathBuf::from) })
    }

    /// `Command`, relativo a `InstallPath` salvo que sea absoluto.
    pub fn program(&self) -> PathBuf {
        let command = Path::new(&self.command);
        if command.is_absolute() {
            command.to_path_buf()
        } else {
            self.install_path.join(command)
        }
    }

    pub fn working_dir(&self) -> &Path {
        self.working_directory.as_deref().unwrap_or(&self.install_path)
    }
}

// String separado por espacios, o array JSON conservado ítem por ítem.
fn arguments(parameters: &StepParameters) -> Result<Vec<String>, StepError> {
    match parameters.get(ARGUMENTS) {
        None => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(s.split_whitespace().map(str::to_string).collect()),
        Some(Value::Array(_)) => parameters.get_list(ARGUMENTS),
        Some(other) => Err(StepError::invalid_parameter(ARGUMENTS, format!("expected a string or list, got {other}"))),
    }
}
