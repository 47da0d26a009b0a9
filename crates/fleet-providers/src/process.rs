//! Arranque, búsqueda y parada de procesos del OS.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fmt::Debug;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, Process, ProcessStatus, ProcessesToUpdate, System};
use thiserror::Error;

/// Campos que identifican un proceso vivo. Solo `pid` y `name` se persisten;
/// el handle se vuelve a obtener del OS en cada tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("failed to start '{program}': {reason}")]
    Start { program: String, reason: String },
    #[error("process {0} not found")]
    NotFound(u32),
    #[error("process {0} already exited")]
    AlreadyExited(u32),
    #[error("access denied to process {0}")]
    AccessDenied(u32),
    #[error("process i/o error: {0}")]
    Io(String),
}

impl ProcessError {
    /// El proceso ya no existe; pararlo no tiene nada que hacer.
    pub fn is_gone(&self) -> bool {
        matches!(self, ProcessError::NotFound(_) | ProcessError::AlreadyExited(_))
    }

    /// Vale la pena reintentar de inmediato.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessError::AccessDenied(_) | ProcessError::Io(_))
    }
}

#[async_trait]
pub trait ProcessPlatform: Send + Sync + Debug {
    async fn start(&self, program: &Path, args: &[String], working_dir: &Path) -> Result<ProcessHandle, ProcessError>;

    /// Proceso vivo con ese pid, o `None` si ya no existe.
    async fn try_find_by_pid(&self, pid: u32) -> Option<ProcessHandle>;

    /// Cualquier proceso vivo con ese nombre.
    async fn try_find_by_name(&self, name: &str) -> Option<ProcessHandle>;

    async fn kill(&self, handle: &ProcessHandle) -> Result<(), ProcessError>;

    async fn has_exited(&self, handle: &ProcessHandle) -> bool;
}

/// Procesos reales: se lanzan con `std::process::Command` y se buscan con
/// `sysinfo`. Los hijos lanzados por esta instancia se guardan para poder
/// cosecharlos.
#[derive(Debug, Default)]
pub struct SystemProcessPlatform {
    system: Mutex<System>,
    children: Mutex<HashMap<u32, Child>>,
}

impl SystemProcessPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(true)` terminó, `Some(false)` corriendo, `None` no es nuestro.
    fn poll_child(&self, pid: u32) -> Option<bool> {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        let child = children.get_mut(&pid)?;
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("process:reaped pid={pid} status={status}");
                children.remove(&pid);
                Some(true)
            }
            Ok(None) => Some(false),
            Err(e) => {
                warn!("process:try-wait-failed pid={pid} err={e}");
                None
            }
        }
    }

    fn with_refreshed<T>(&self, pid: Option<u32>, f: impl FnOnce(&System) -> T) -> T {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        match pid {
            Some(pid) => {
                system.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
            }
            None => {
                system.refresh_processes(ProcessesToUpdate::All, true);
            }
        }
        f(&system)
    }
}

fn is_alive(process: &Process) -> bool {
    !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
}

fn matches_name(process: &Process, name: &str) -> bool {
    let name = OsStr::new(name);
    process.name() == name || process.exe().and_then(Path::file_name) == Some(name)
}

fn to_handle(process: &Process, name: &str) -> ProcessHandle {
    let started_at = DateTime::<Utc>::from_timestamp(process.start_time() as i64, 0).unwrap_or_else(Utc::now);
    ProcessHandle { pid: process.pid().as_u32(),
                    name: name.to_string(),
                    started_at }
}

fn process_name(program: &Path) -> String {
    program.file_name()
           .map(|n| n.to_string_lossy().into_owned())
           .unwrap_or_else(|| program.to_string_lossy().into_owned())
}

fn kill_error(pid: u32, e: io::Error) -> ProcessError {
    match e.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::NotFound => ProcessError::AlreadyExited(pid),
        io::ErrorKind::PermissionDenied => ProcessError::AccessDenied(pid),
        _ => ProcessError::Io(e.to_string()),
    }
}

#[async_trait]
impl ProcessPlatform for SystemProcessPlatform {
    async fn start(&self, program: &Path, args: &[String], working_dir: &Path) -> Result<ProcessHandle, ProcessError> {
        let child = Command::new(program).args(args)
                                         .current_dir(working_dir)
                                         .stdin(Stdio::null())
                                         .stdout(Stdio::null())
                                         .stderr(Stdio::null())
                                         .spawn()
                                         .map_err(|e| ProcessError::Start { program: program.display().to_string(),
                                                                            reason: e.to_string() })?;
        let handle = ProcessHandle { pid: child.id(),
                                     name: process_name(program),
                                     started_at: Utc::now() };
        debug!("process:spawned pid={} name={}", handle.pid, handle.name);
        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handle.pid, child);
        Ok(handle)
    }

    async fn try_find_by_pid(&self, pid: u32) -> Option<ProcessHandle> {
        if self.poll_child(pid) == Some(true) {
            return None;
        }
        self.with_refreshed(Some(pid), |system| {
                system.process(Pid::from_u32(pid))
                      .filter(|p| is_alive(p))
                      .map(|p| to_handle(p, &p.name().to_string_lossy()))
            })
    }

    async fn try_find_by_name(&self, name: &str) -> Option<ProcessHandle> {
        self.with_refreshed(None, |system| {
                system.processes()
                      .values()
                      .find(|p| is_alive(p) && matches_name(p, name))
                      .map(|p| to_handle(p, name))
            })
    }

    async fn kill(&self, handle: &ProcessHandle) -> Result<(), ProcessError> {
        let owned = {
            let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
            match children.get_mut(&handle.pid) {
                Some(child) => {
                    let killed = child.kill().map_err(|e| kill_error(handle.pid, e));
                    // SIGKILL es inmediato; cosechar si el hijo ya no está.
                    if let Ok(Some(_)) = child.try_wait() {
                        children.remove(&handle.pid);
                    }
                    Some(killed)
                }
                None => None,
            }
        };
        if let Some(killed) = owned {
            return killed;
        }
        self.with_refreshed(Some(handle.pid), |system| match system.process(Pid::from_u32(handle.pid)) {
                None => Err(ProcessError::NotFound(handle.pid)),
                Some(p) if !is_alive(p) => Err(ProcessError::AlreadyExited(handle.pid)),
                Some(p) if p.kill() => Ok(()),
                Some(_) => Err(ProcessError::AccessDenied(handle.pid)),
            })
    }

    async fn has_exited(&self, handle: &ProcessHandle) -> bool {
        if let Some(exited) = self.poll_child(handle.pid) {
            return exited;
        }
        self.with_refreshed(Some(handle.pid), |system| {
                system.process(Pid::from_u32(handle.pid))
                      .map(|p| !is_alive(p) || !matches_name(p, &handle.name))
                      .unwrap_or(true)
            })
    }
}
