//! Contrato de aprovisionamiento de resource groups en la nube.
//!
//! Ambas llamadas son idempotentes y sirven también como refresco de estado:
//! invocar deploy con un deployment en vuelo informa su estado actual, e
//! invocarlo sobre uno terminado no hace nada y devuelve el estado final.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use fleet_core::CancellationToken;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Todo lo necesario para crear (y luego borrar) un resource group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroupSpec {
    pub name: String,
    pub region: String,
    pub vm_sku: String,
    pub os_disk_sku: String,
    pub vm_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub resource_group: ProvisioningState,
    pub virtual_machines: Vec<ProvisioningState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentOutcome {
    Succeeded,
    Failed,
    InProgress,
}

impl DeploymentStatus {
    pub fn in_progress() -> Self {
        Self { resource_group: ProvisioningState::Running,
               virtual_machines: Vec::new(),
               resource_id: None,
               message: None }
    }

    /// Exitoso solo si el grupo y cada una de sus VMs terminaron bien; cualquier
    /// parte fallida hace fallar el deployment completo.
    pub fn outcome(&self) -> DeploymentOutcome {
        let vm_failed = self.virtual_machines.iter().any(|s| *s == ProvisioningState::Failed);
        if self.resource_group == ProvisioningState::Failed || vm_failed {
            return DeploymentOutcome::Failed;
        }
        let vms_ok = !self.virtual_machines.is_empty()
                     && self.virtual_machines.iter().all(|s| *s == ProvisioningState::Succeeded);
        if self.resource_group == ProvisioningState::Succeeded && vms_ok {
            DeploymentOutcome::Succeeded
        } else {
            DeploymentOutcome::InProgress
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionStatus {
    Succeeded,
    Accepted,
    InProgress,
    Failed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    #[error("provisioning request failed: {0}")]
    Request(String),
    #[error("provisioning request throttled: {0}")]
    Throttled(String),
    #[error("provisioning call cancelled")]
    Cancelled,
}

#[async_trait]
pub trait ProvisioningClient: Send + Sync + Debug {
    async fn deploy_resource_group(&self,
                                   spec: &ResourceGroupSpec,
                                   cancellation: &CancellationToken)
                                   -> Result<DeploymentStatus, ProvisioningError>;

    async fn delete_resource_group(&self,
                                   spec: &ResourceGroupSpec,
                                   cancellation: &CancellationToken)
                                   -> Result<DeletionStatus, ProvisioningError>;
}
