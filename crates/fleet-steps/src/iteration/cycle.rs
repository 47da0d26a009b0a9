//! Ciclo crear → verificar → borrar, una regla por tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleet_core::constants::{LOCAL_RETRY_ATTEMPTS, LOCAL_RETRY_BASE_DELAY};
use fleet_core::retry::with_retry;
use fleet_core::{Deadline, StepError, StepResult, TickContext};
use fleet_providers::{DeletionStatus, DeploymentOutcome, FileSystem, FileSystemError, ProvisioningClient, ReservedSession,
                      ResourceGroupSpec, SessionClient};
use log::{debug, info, warn};

use super::parameters::{IterationParameters, Placement};
use super::spec_builder::build_spec;
use super::state::{ActiveIterationState, IterationState};

/// Regla 1: armar el próximo grupo y pedir su deployment.
pub(super) async fn begin_iteration(tick: &TickContext<'_>,
                                    parameters: &IterationParameters,
                                    client: &dyn ProvisioningClient,
                                    state: &mut IterationState)
                                    -> Result<StepResult, StepError> {
    let session = match lookup_session(tick, parameters).await {
        Ok(session) => session,
        Err(StepError::Provider(reason)) => {
            record_failure(tick, state, &reason)?;
            return Ok(StepResult::in_progress());
        }
        Err(e) => return Err(e),
    };
    let iteration = state.iteration + 1;
    let spec = build_spec(parameters, tick.context, iteration, session.as_ref())?;
    state.iteration = iteration;
    write_specification(tick, parameters, &spec).await;

    state.active_iteration_resource_group = Some(spec.clone());
    state.active_iteration_state = Some(ActiveIterationState::Creating);
    state.active_iteration_deadline = Some(Deadline::after(tick.now(), parameters.iteration_timeout));
    state.active_resource_id = None;
    info!("iteration:create iteration={iteration} group={} region={} vm_sku={} disk_sku={} vms={} {}",
          spec.name,
          spec.region,
          spec.vm_sku,
          spec.os_disk_sku,
          spec.vm_count,
          tick.telemetry);

    if let Err(e) = client.deploy_resource_group(&spec, tick.cancellation).await {
        state.active_iteration_state = Some(ActiveIterationState::CreationFailed);
        record_failure(tick, state, &e.to_string())?;
    }
    Ok(StepResult::in_progress())
}

/// Regla 2: refrescar el deployment y clasificarlo.
pub(super) async fn refresh_creation(tick: &TickContext<'_>,
                                     _parameters: &IterationParameters,
                                     client: &dyn ProvisioningClient,
                                     state: &mut IterationState)
                                     -> Result<StepResult, StepError> {
    let spec = active_spec(state)?;
    let failure = match client.deploy_resource_group(&spec, tick.cancellation).await {
        Ok(status) => match status.outcome() {
            DeploymentOutcome::Succeeded => {
                let id = status.resource_id.unwrap_or_else(|| spec.name.clone());
                state.active_iteration_state = Some(ActiveIterationState::Created);
                state.consecutive_failures = 0;
                state.successful_iterations.push(id.clone());
                state.active_resource_id = Some(id);
                info!("iteration:created iteration={} group={} successes={} {}",
                      state.iteration,
                      spec.name,
                      state.successful_iterations.len(),
                      tick.telemetry);
                return Ok(StepResult::in_progress());
            }
            DeploymentOutcome::Failed => status.message.unwrap_or_else(|| "deployment failed".to_string()),
            DeploymentOutcome::InProgress if phase_expired(state, tick.now()) => {
                "deployment did not finish before the iteration deadline".to_string()
            }
            DeploymentOutcome::InProgress => {
                debug!("iteration:creating group={} {}", spec.name, tick.telemetry);
                return Ok(StepResult::in_progress());
            }
        },
        Err(e) => e.to_string(),
    };
    state.active_iteration_state = Some(ActiveIterationState::CreationFailed);
    record_failure(tick, state, &failure)?;
    Ok(StepResult::in_progress())
}

/// Regla 3: pedir el borrado de un grupo creado (o creado a medias).
pub(super) async fn begin_deletion(tick: &TickContext<'_>,
                                   parameters: &IterationParameters,
                                   client: &dyn ProvisioningClient,
                                   state: &mut IterationState)
                                   -> Result<StepResult, StepError> {
    let spec = active_spec(state)?;
    state.active_iteration_state = Some(ActiveIterationState::Deleting);
    state.active_iteration_deadline = Some(Deadline::after(tick.now(), parameters.iteration_timeout));
    info!("iteration:delete iteration={} group={} {}", state.iteration, spec.name, tick.telemetry);
    if let Err(e) = client.delete_resource_group(&spec, tick.cancellation).await {
        return fail_deletion(tick, state, &e.to_string());
    }
    Ok(StepResult::in_progress())
}

/// Regla 4: refrescar el borrado y clasificarlo.
pub(super) async fn refresh_deletion(tick: &TickContext<'_>,
                                     _parameters: &IterationParameters,
                                     client: &dyn ProvisioningClient,
                                     state: &mut IterationState)
                                     -> Result<StepResult, StepError> {
    let spec = active_spec(state)?;
    match client.delete_resource_group(&spec, tick.cancellation).await {
        Ok(DeletionStatus::Succeeded) => {
            state.active_iteration_state = Some(ActiveIterationState::Deleted);
            // Limpiar tras una creación fallida no es una iteración sana.
            if state.active_resource_id.is_some() {
                state.consecutive_failures = 0;
            }
            info!("iteration:deleted iteration={} group={} successes={} {}",
                  state.iteration,
                  spec.name,
                  state.successful_iterations.len(),
                  tick.telemetry);
            Ok(StepResult::in_progress())
        }
        Ok(DeletionStatus::Accepted | DeletionStatus::InProgress) if !phase_expired(state, tick.now()) => {
            debug!("iteration:deleting group={} {}", spec.name, tick.telemetry);
            Ok(StepResult::in_progress())
        }
        Ok(DeletionStatus::Accepted | DeletionStatus::InProgress) => {
            fail_deletion(tick, state, "deletion did not finish before the iteration deadline")
        }
        Ok(DeletionStatus::Failed(reason)) => fail_deletion(tick, state, &reason),
        Err(e) => fail_deletion(tick, state, &e.to_string()),
    }
}

/// Cuenta una fase fallida; llegar al máximo hace fallar el step.
fn record_failure(tick: &TickContext<'_>, state: &mut IterationState, reason: &str) -> Result<(), StepError> {
    state.consecutive_failures += 1;
    warn!("iteration:failure iteration={} consecutive={}/{} reason=\"{reason}\" {}",
          state.iteration,
          state.consecutive_failures,
          state.maximum_consecutive_failure,
          tick.telemetry);
    if state.consecutive_failures >= state.maximum_consecutive_failure {
        return Err(StepError::MaximumFailuresReached { failures: state.consecutive_failures,
                                                       maximum: state.maximum_consecutive_failure });
    }
    Ok(())
}

// Un grupo cuyo borrado falló nunca cuenta como iteración completa.
fn fail_deletion(tick: &TickContext<'_>, state: &mut IterationState, reason: &str) -> Result<StepResult, StepError> {
    state.active_iteration_state = Some(ActiveIterationState::DeletionFailed);
    if let Some(id) = state.active_resource_id.take() {
        if state.successful_iterations.last() == Some(&id) {
            state.successful_iterations.pop();
        }
    }
    record_failure(tick, state, reason)?;
    Ok(StepResult::in_progress())
}

fn active_spec(state: &IterationState) -> Result<ResourceGroupSpec, StepError> {
    state.active_iteration_resource_group
         .clone()
         .ok_or_else(|| StepError::Internal("active iteration has no resource group".into()))
}

fn phase_expired(state: &IterationState, now: DateTime<Utc>) -> bool {
    state.active_iteration_deadline.is_some_and(|d| d.is_expired(now))
}

/// `Ok(None)` con regiones explícitas. Una sesión desconocida es error de
/// configuración; una consulta fallida es error del provider.
async fn lookup_session(tick: &TickContext<'_>,
                        parameters: &IterationParameters)
                        -> Result<Option<ReservedSession>, StepError> {
    let Placement::ReservedSession(id) = &parameters.placement else {
        return Ok(None);
    };
    let sessions = tick.dependencies.resolve::<Arc<dyn SessionClient>>()?;
    match sessions.get_session(id).await {
        Ok(Some(session)) => Ok(Some(session)),
        Ok(None) => Err(StepError::Configuration(format!("reserved session '{id}' not found"))),
        Err(e) => Err(StepError::Provider(e.to_string())),
    }
}

/// Best effort: se reintenta unas pocas veces y luego se loguea y descarta.
async fn write_specification(tick: &TickContext<'_>, parameters: &IterationParameters, spec: &ResourceGroupSpec) {
    let Some(dir) = parameters.specification_path.as_deref() else {
        return;
    };
    let fs = match tick.dependencies.resolve::<Arc<dyn FileSystem>>() {
        Ok(fs) => fs,
        Err(e) => {
            warn!("iteration:spec-write-skipped err={e} {}", tick.telemetry);
            return;
        }
    };
    let contents = match serde_json::to_string_pretty(spec) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("iteration:spec-write-skipped err={e} {}", tick.telemetry);
            return;
        }
    };
    let path = dir.join(format!("{}.json", spec.name));
    let (fs, target, body) = (fs.as_ref(), path.as_path(), contents.as_str());
    let written = with_retry("specification write",
                             LOCAL_RETRY_ATTEMPTS,
                             LOCAL_RETRY_BASE_DELAY,
                             |_: &FileSystemError| true,
                             move || fs.write_file(target, body)).await;
    match written {
        Ok(()) => debug!("iteration:spec-written path={} {}", path.display(), tick.telemetry),
        Err(e) => warn!("iteration:spec-write-failed path={} err={e} {}", path.display(), tick.telemetry),
    }
}
