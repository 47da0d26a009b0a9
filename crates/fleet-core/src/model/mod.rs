//! Entradas de cada tick: identidad, parámetros y telemetría.

pub mod context;
pub mod parameters;
pub mod telemetry;

pub use context::StepContext;
pub use parameters::{parse_duration, StepParameters};
pub use telemetry::TelemetryContext;
