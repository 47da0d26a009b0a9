//! Steps reanudables concretos.
//!
//! - `WorkerProcessStep`: arranca un proceso worker externo y lo mantiene vivo
//!   (reinicios acotados) hasta que vence su duración.
//! - `ResourceIterationStep`: crea y borra repetidamente un resource group,
//!   con circuit breaker por fallos consecutivos.
//!
//! Ambos son `fleet_core::ResumableStep` y se ejecutan a través de
//! `fleet_core::TickRunner`.
pub mod iteration;
pub mod process;

pub use iteration::{ActiveIterationState, IterationParameters, IterationState, ResourceIterationStep};
pub use process::{ProcessParameters, ProcessState, WorkerProcessStep};
