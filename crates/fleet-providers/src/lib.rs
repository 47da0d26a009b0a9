//! Interfaces de los colaboradores que manejan los controladores, con las
//! implementaciones reales (OS, file system, entorno) y fakes en memoria.
//!
//! Cada trait es object safe y se registra en el
//! `fleet_core::DependencyRegistry` como `Arc<dyn Trait>`.
pub mod filesystem;
pub mod mock;
pub mod process;
pub mod provisioning;
pub mod secrets;
pub mod session;

pub use filesystem::{FileSystem, FileSystemError, LocalFileSystem};
pub use process::{ProcessError, ProcessHandle, ProcessPlatform, SystemProcessPlatform};
pub use provisioning::{DeletionStatus, DeploymentOutcome, DeploymentStatus, ProvisioningClient, ProvisioningError,
                       ProvisioningState, ResourceGroupSpec};
pub use secrets::{EnvSecretResolver, SecretError, SecretResolver};
pub use session::{ReservedSession, SessionClient};
