//! fleetflow
//!
//! Driver local del motor de steps reanudables:
//! - `config`: configuración del runner desde el entorno.
//! - `polling`: hace de scheduler, tickeando un step hasta que termina.
//! - `error`: errores del driver y del binario.
//!
//! El motor y los controladores viven en los crates del workspace y se
//! re-exportan aquí.

pub mod config;
pub mod error;
pub mod polling;

pub use config::RunnerConfig;
pub use error::FleetError;
pub use polling::{run_until_terminal, PollOutcome, StopReason};

pub use fleet_core as core;
pub use fleet_persistence as persistence;
pub use fleet_providers as providers;
pub use fleet_steps as steps;
