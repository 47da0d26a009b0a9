//! Fakes en memoria de cada provider, para tests de controladores y dry runs.
//!
//! Cada fake registra las llamadas que recibe y se puede programar para
//! fallar, así un test mantiene un `Arc` al fake concreto mientras el step lo
//! resuelve como `Arc<dyn Trait>` desde el registry.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use fleet_core::CancellationToken;

use crate::filesystem::{FileSystem, FileSystemError};
use crate::process::{ProcessError, ProcessHandle, ProcessPlatform};
use crate::provisioning::{DeletionStatus, DeploymentStatus, ProvisioningClient, ProvisioningError, ProvisioningState,
                          ResourceGroupSpec};
use crate::secrets::{secret_name, SecretError, SecretResolver};
use crate::session::{ReservedSession, SessionClient};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------- procesos

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCall {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

#[derive(Debug)]
struct MockProcess {
    handle: ProcessHandle,
    alive: bool,
}

#[derive(Debug)]
pub struct MockProcessPlatform {
    processes: DashMap<u32, MockProcess>,
    next_pid: AtomicU32,
    starts: Mutex<Vec<StartCall>>,
    exit_on_start: AtomicBool,
    start_error: Mutex<Option<ProcessError>>,
    kill_errors: Mutex<VecDeque<ProcessError>>,
    kills: AtomicU32,
}

impl Default for MockProcessPlatform {
    fn default() -> Self {
        Self { processes: DashMap::new(),
               next_pid: AtomicU32::new(4000),
               starts: Mutex::new(Vec::new()),
               exit_on_start: AtomicBool::new(false),
               start_error: Mutex::new(None),
               kill_errors: Mutex::new(VecDeque::new()),
               kills: AtomicU32::new(0) }
    }
}

impl MockProcessPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Los procesos arrancados terminan enseguida (crash de arranque).
    pub fn set_exit_on_start(&self, exit: bool) {
        self.exit_on_start.store(exit, Ordering::SeqCst);
    }

    /// El próximo `start` falla con `error`.
    pub fn fail_next_start(&self, error: ProcessError) {
        *lock(&self.start_error) = Some(error);
    }

    /// Encola un error para la próxima llamada a `kill`.
    pub fn push_kill_error(&self, error: ProcessError) {
        lock(&self.kill_errors).push_back(error);
    }

    /// Un proceso vivo que esta plataforma no arrancó, p.ej. un worker que
    /// sobrevivió a un reinicio del orquestador.
    pub fn insert_running(&self, pid: u32, name: &str) -> ProcessHandle {
        let handle = ProcessHandle { pid,
                                     name: name.to_string(),
                                     started_at: Utc::now() };
        self.processes.insert(pid,
                              MockProcess { handle: handle.clone(),
                                            alive: true });
        handle
    }

    /// Marca un proceso como terminado.
    pub fn crash(&self, pid: u32) {
        if let Some(mut p) = self.processes.get_mut(&pid) {
            p.alive = false;
        }
    }

    /// Olvida todos los procesos, como tras un reinicio del host.
    pub fn reboot(&self) {
        self.processes.clear();
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.processes.get(&pid).map(|p| p.alive).unwrap_or(false)
    }

    pub fn starts(&self) -> Vec<StartCall> {
        lock(&self.starts).clone()
    }

    pub fn kill_count(&self) -> u32 {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessPlatform for MockProcessPlatform {
    async fn start(&self, program: &Path, args: &[String], working_dir: &Path) -> Result<ProcessHandle, ProcessError> {
        lock(&self.starts).push(StartCall { program: program.to_path_buf(),
                                            args: args.to_vec(),
                                            working_dir: working_dir.to_path_buf() });
        if let Some(err) = lock(&self.start_error).take() {
            return Err(err);
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let name = program.file_name()
                          .map(|n| n.to_string_lossy().into_owned())
                          .unwrap_or_default();
        let handle = ProcessHandle { pid,
                                     name,
                                     started_at: Utc::now() };
        let alive = !self.exit_on_start.load(Ordering::SeqCst);
        self.processes.insert(pid,
                              MockProcess { handle: handle.clone(),
                                            alive });
        Ok(handle)
    }

    async fn try_find_by_pid(&self, pid: u32) -> Option<ProcessHandle> {
        self.processes
            .get(&pid)
            .filter(|p| p.alive)
            .map(|p| p.handle.clone())
    }

    async fn try_find_by_name(&self, name: &str) -> Option<ProcessHandle> {
        self.processes
            .iter()
            .find(|p| p.alive && p.handle.name == name)
            .map(|p| p.handle.clone())
    }

    async fn kill(&self, handle: &ProcessHandle) -> Result<(), ProcessError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.kill_errors).pop_front() {
            return Err(err);
        }
        match self.processes.get_mut(&handle.pid) {
            None => Err(ProcessError::NotFound(handle.pid)),
            Some(p) if !p.alive => Err(ProcessError::AlreadyExited(handle.pid)),
            Some(mut p) => {
                p.alive = false;
                Ok(())
            }
        }
    }

    async fn has_exited(&self, handle: &ProcessHandle) -> bool {
        !self.is_alive(handle.pid)
    }
}

// ------------------------------------------------------------- file system

#[derive(Debug, Default)]
pub struct MockFileSystem {
    paths: DashSet<PathBuf>,
    files: DashMap<PathBuf, String>,
    write_failures: AtomicU32,
    write_attempts: AtomicU32,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_path(&self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    /// Las próximas `count` escrituras fallan.
    pub fn fail_next_writes(&self, count: u32) {
        self.write_failures.store(count, Ordering::SeqCst);
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        self.files.get(path).map(|f| f.value().clone())
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn write_attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSystem for MockFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        self.paths.contains(path) || self.files.contains_key(path)
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), FileSystemError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self.write_failures
                          .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                          .is_ok();
        if failing {
            return Err(FileSystemError::Io { path: path.display().to_string(),
                                             reason: "simulated write failure".into() });
        }
        self.files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------- secretos

#[derive(Debug, Default)]
pub struct MockSecretResolver {
    secrets: DashMap<String, String>,
}

impl MockSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, name: &str, value: &str) -> Self {
        self.secrets.insert(name.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SecretResolver for MockSecretResolver {
    async fn resolve_secret(&self, reference: &str, cancellation: &CancellationToken) -> Result<String, SecretError> {
        if cancellation.is_cancelled() {
            return Err(SecretError::Cancelled);
        }
        let name = secret_name(reference).ok_or_else(|| SecretError::InvalidReference(reference.to_string()))?;
        self.secrets
            .get(name)
            .map(|v| v.value().clone())
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

// ----------------------------------------------------------- aprovisionamiento

/// Deployment de `spec` donde el grupo y todas sus VMs terminaron bien.
pub fn succeeded_deployment(spec: &ResourceGroupSpec) -> DeploymentStatus {
    DeploymentStatus { resource_group: ProvisioningState::Succeeded,
                       virtual_machines: vec![ProvisioningState::Succeeded; spec.vm_count.max(1) as usize],
                       resource_id: Some(format!("/subscriptions/mock/resourceGroups/{}", spec.name)),
                       message: None }
}

pub fn failed_deployment(message: &str) -> DeploymentStatus {
    DeploymentStatus { resource_group: ProvisioningState::Failed,
                       virtual_machines: vec![ProvisioningState::Failed],
                       resource_id: None,
                       message: Some(message.to_string()) }
}

/// Cliente de aprovisionamiento programable. Las respuestas programadas se
/// consumen en orden; vacío el guion, aplica el default (deployments y
/// borrados exitosos) salvo que se haya fijado otro.
#[derive(Debug, Default)]
pub struct MockProvisioningClient {
    deploy_script: Mutex<VecDeque<Result<DeploymentStatus, ProvisioningError>>>,
    deploy_default: Mutex<Option<Result<DeploymentStatus, ProvisioningError>>>,
    delete_script: Mutex<VecDeque<Result<DeletionStatus, ProvisioningError>>>,
    delete_default: Mutex<Option<Result<DeletionStatus, ProvisioningError>>>,
    deploys: Mutex<Vec<ResourceGroupSpec>>,
    deletes: Mutex<Vec<ResourceGroupSpec>>,
}

impl MockProvisioningClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_deploy(&self, response: Result<DeploymentStatus, ProvisioningError>) {
        lock(&self.deploy_script).push_back(response);
    }

    pub fn set_deploy_default(&self, response: Result<DeploymentStatus, ProvisioningError>) {
        *lock(&self.deploy_default) = Some(response);
    }

    pub fn script_delete(&self, response: Result<DeletionStatus, ProvisioningError>) {
        lock(&self.delete_script).push_back(response);
    }

    pub fn set_delete_default(&self, response: Result<DeletionStatus, ProvisioningError>) {
        *lock(&self.delete_default) = Some(response);
    }

    pub fn deploy_calls(&self) -> Vec<ResourceGroupSpec> {
        lock(&self.deploys).clone()
    }

    pub fn delete_calls(&self) -> Vec<ResourceGroupSpec> {
        lock(&self.deletes).clone()
    }
}

#[async_trait]
impl ProvisioningClient for MockProvisioningClient {
    async fn deploy_resource_group(&self,
                                   spec: &ResourceGroupSpec,
                                   cancellation: &CancellationToken)
                                   -> Result<DeploymentStatus, ProvisioningError> {
        if cancellation.is_cancelled() {
            return Err(ProvisioningError::Cancelled);
        }
        lock(&self.deploys).push(spec.clone());
        if let Some(scripted) = lock(&self.deploy_script).pop_front() {
            return scripted;
        }
        match lock(&self.deploy_default).clone() {
            Some(response) => response,
            None => Ok(succeeded_deployment(spec)),
        }
    }

    async fn delete_resource_group(&self,
                                   spec: &ResourceGroupSpec,
                                   cancellation: &CancellationToken)
                                   -> Result<DeletionStatus, ProvisioningError> {
        if cancellation.is_cancelled() {
            return Err(ProvisioningError::Cancelled);
        }
        lock(&self.deletes).push(spec.clone());
        if let Some(scripted) = lock(&self.delete_script).pop_front() {
            return scripted;
        }
        lock(&self.delete_default).clone().unwrap_or(Ok(DeletionStatus::Succeeded))
    }
}

// ---------------------------------------------------------------- sesiones

#[derive(Debug, Default)]
pub struct MockSessionClient {
    sessions: DashMap<String, ReservedSession>,
}

impl MockSessionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, session: ReservedSession) -> Self {
        self.sessions.insert(session.id.clone(), session);
        self
    }
}

#[async_trait]
impl SessionClient for MockSessionClient {
    async fn get_session(&self, id: &str) -> Result<Option<ReservedSession>, ProvisioningError> {
        Ok(self.sessions.get(id).map(|s| s.value().clone()))
    }
}
