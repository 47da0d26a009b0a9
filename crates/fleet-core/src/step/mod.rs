mod definition;
mod result;
mod runner;
mod status;

pub use definition::{ResumableStep, Step, TickContext};
pub use result::{StepFailure, StepResult};
pub use runner::TickRunner;
pub use status::StepStatus;
