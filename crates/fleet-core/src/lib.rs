//! fleet-core: motor de ejecución de steps reanudables.
//!
//! Un step es re-invocado por un scheduler externo una vez por tick. Cada tick
//! puede caer en otro proceso o máquina, así que la única memoria entre ticks
//! es lo que el step persiste mediante un `StateStore`. Este crate define:
//! - `StepResult` / `StepStatus`: lo que un tick informa al scheduler.
//! - `ResumableStep`: contrato que implementa cada controlador concreto.
//! - `TickRunner`: frontera común del tick (validación, configuración única
//!   de dependencias, carga/guardado de estado, traducción de errores y
//!   panics).
//! - `StateStore` con una implementación en memoria.
//! - Helpers compartidos: parámetros, deadlines, reintentos, semillas
//!   deterministas, ofuscación de secretos y abstracción de reloj.
pub mod clock;
pub mod constants;
pub mod deadline;
pub mod dependencies;
pub mod errors;
pub mod hashing;
pub mod model;
pub mod redact;
pub mod retry;
pub mod state;
pub mod step;

pub use clock::{Clock, ManualClock, SystemClock};
pub use deadline::Deadline;
pub use dependencies::DependencyRegistry;
pub use errors::{classify_error, ErrorClass, ErrorKind, StateStoreError, StepError};
pub use model::{StepContext, StepParameters, TelemetryContext};
pub use state::{InMemoryStateStore, StateKey, StateScope, StateStore, StateStoreExt};
pub use step::{ResumableStep, Step, StepFailure, StepResult, StepStatus, TickContext, TickRunner};

pub use tokio_util::sync::CancellationToken;
