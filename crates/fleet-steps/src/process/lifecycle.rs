use chrono::{DateTime, Utc};
use fleet_core::constants::{LOCAL_RETRY_ATTEMPTS, LOCAL_RETRY_BASE_DELAY};
use fleet_core::retry::with_retry;
use fleet_core::{Deadline, StepError, StepResult, TickContext};
use fleet_providers::{FileSystem, ProcessError, ProcessHandle, ProcessPlatform};
use log::{debug, info, warn};

use super::command::{build_arguments, display_command, resolve_secrets};
use super::{Collaborators, ProcessParameters, ProcessState, WorkerProcessStep};

impl WorkerProcessStep {
    pub(super) async fn check_dependencies(&self,
                                           tick: &TickContext<'_>,
                                           parameters: &ProcessParameters,
                                           fs: &dyn FileSystem,
                                           state: &mut ProcessState,
                                           now: DateTime<Utc>)
                                           -> Result<StepResult, StepError> {
        if state.step_timeout.is_expired(now) {
            return Err(StepError::DependencyNotFound { path: parameters.install_path.display().to_string(),
                                                       deadline: state.step_timeout.instant() });
        }
        if fs.exists(&parameters.install_path).await {
            state.dependencies_installed = true;
            info!("process:dependencies-found path={} {}",
                  parameters.install_path.display(),
                  tick.telemetry);
            return Ok(StepResult::in_progress_continue().with_extension(parameters.duration));
        }
        debug!("process:dependencies-pending path={} deadline={} {}",
               parameters.install_path.display(),
               state.step_timeout.instant(),
               tick.telemetry);
        Ok(StepResult::in_progress_continue())
    }

    /// Arranca el worker. Todo arranque posterior al primero confirmado es un
    /// reinicio y cuenta contra el presupuesto, salga bien o no.
    pub(super) async fn start_worker(&self,
                                     tick: &TickContext<'_>,
                                     parameters: &ProcessParameters,
                                     collaborators: &Collaborators,
                                     state: &mut ProcessState,
                                     now: DateTime<Utc>)
                                     -> Result<StepResult, StepError> {
        if tick.is_cancelled() {
            info!("process:start-skipped reason=cancelled {}", tick.telemetry);
            return Ok(StepResult::in_progress());
        }
        if !state.has_started() {
            state.step_timeout.ensure_not_expired(now, "process start")?;
        }
        let Some(resolved) = resolve_secrets(parameters, collaborators.resolver.as_ref(), tick.cancellation).await?
        else {
            info!("process:start-skipped reason=cancelled {}", tick.telemetry);
            return Ok(StepResult::in_progress());
        };

        if state.has_started() {
            state.restart_count += 1;
            if state.restart_count >= parameters.max_restarts {
                let name = state.process_name.clone().unwrap_or_else(|| parameters.command.clone());
                return Err(StepError::RestartLimitExceeded { name,
                                                             restarts: state.restart_count,
                                                             maximum: parameters.max_restarts });
            }
        }

        let program = parameters.program();
        let args = build_arguments(parameters, &tick.context.experiment_id, resolved.telemetry.as_deref());
        info!("process:starting command=\"{}\" restarts={} {}",
              display_command(&program, &args, &resolved.secrets),
              state.restart_count,
              tick.telemetry);

        let platform = collaborators.platform.as_ref();
        let handle = match platform.start(&program, &args, parameters.working_dir()).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("process:start-failed err={e} {}", tick.telemetry);
                return Ok(StepResult::in_progress_continue());
            }
        };
        if platform.has_exited(&handle).await {
            warn!("process:exited-on-start pid={} name={} {}", handle.pid, handle.name, tick.telemetry);
            return Ok(StepResult::in_progress_continue());
        }

        state.process_running = true;
        state.process_id = Some(handle.pid);
        state.process_name = Some(handle.name.clone());
        let end = *state.process_end_time
                        .get_or_insert_with(|| Deadline::after(now, parameters.duration).instant());
        info!("process:started pid={} name={} end={end} {}",
              handle.pid,
              handle.name,
              tick.telemetry);
        self.handles.insert(tick.context.clone(), handle);

        let remaining = (end - now).to_std().unwrap_or_default();
        Ok(StepResult::in_progress_continue().with_extension(remaining))
    }

    pub(super) async fn monitor_worker(&self,
                                       tick: &TickContext<'_>,
                                       parameters: &ProcessParameters,
                                       collaborators: &Collaborators,
                                       state: &mut ProcessState,
                                       now: DateTime<Utc>)
                                       -> Result<StepResult, StepError> {
        let platform = collaborators.platform.as_ref();
        match self.reacquire(tick, platform, state).await {
            Some(handle) if state.duration_expired(now) => {
                info!("process:duration-elapsed pid={} {}", handle.pid, tick.telemetry);
                stop_worker(platform, &handle).await?;
                state.process_running = false;
                Ok(StepResult::succeeded())
            }
            Some(handle) => {
                debug!("process:running pid={} {}", handle.pid, tick.telemetry);
                Ok(StepResult::in_progress_continue())
            }
            None => {
                self.handles.remove(tick.context);
                state.process_running = false;
                if state.duration_expired(now) {
                    info!("process:exited-after-end-time pid={:?} {}", state.process_id, tick.telemetry);
                    return Ok(StepResult::succeeded());
                }
                warn!("process:crash-detected pid={:?} name={:?} restarts={} {}",
                      state.process_id,
                      state.process_name,
                      state.restart_count,
                      tick.telemetry);
                self.start_worker(tick, parameters, collaborators, state, now).await
            }
        }
    }

    /// Handle vivo del worker seguido, si lo hay.
    ///
    /// El handle cacheado solo vale mientras siga vivo. Si no, se busca el worker
    /// por pid (el nombre debe coincidir, los pids se reutilizan) y luego por
    /// nombre; una coincidencia solo por nombre se re-adopta sin contar reinicio.
    async fn reacquire(&self,
                       tick: &TickContext<'_>,
                       platform: &dyn ProcessPlatform,
                       state: &mut ProcessState)
                       -> Option<ProcessHandle> {
        let cached = self.tracked_handle(tick.context)
                         .filter(|h| Some(h.pid) == state.process_id);
        if let Some(cached) = cached {
            if !platform.has_exited(&cached).await {
                return Some(cached);
            }
            debug!("process:cached-handle-exited pid={} {}", cached.pid, tick.telemetry);
            self.handles.remove(tick.context);
        }

        let name = state.process_name.clone()?;
        if let Some(pid) = state.process_id {
            let by_pid = platform.try_find_by_pid(pid).await.filter(|h| h.name == name);
            if let Some(handle) = by_pid {
                self.handles.insert(tick.context.clone(), handle.clone());
                return Some(handle);
            }
        }

        let survivor = platform.try_find_by_name(&name).await?;
        info!("process:re-adopted pid={} previous_pid={:?} name={name} {}",
              survivor.pid,
              state.process_id,
              tick.telemetry);
        state.process_id = Some(survivor.pid);
        self.handles.insert(tick.context.clone(), survivor.clone());
        Some(survivor)
    }
}

/// Mata el worker con algunos reintentos inmediatos ante errores
/// transitorios. Un worker que ya no está cuenta como parado; solo se
/// devuelve error si el worker sigue vivo después.
pub(super) async fn stop_worker(platform: &dyn ProcessPlatform, handle: &ProcessHandle) -> Result<(), StepError> {
    let killed = with_retry("process kill",
                            LOCAL_RETRY_ATTEMPTS,
                            LOCAL_RETRY_BASE_DELAY,
                            ProcessError::is_transient,
                            move || platform.kill(handle)).await;
    let Err(e) = killed else {
        return Ok(());
    };
    if e.is_gone() || platform.has_exited(handle).await {
        debug!("process:already-stopped pid={} err={e}", handle.pid);
        return Ok(());
    }
    Err(StepError::Process(format!("could not stop process {} ({}): {e}", handle.pid, handle.name)))
}
