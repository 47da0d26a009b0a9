use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provisioning::ProvisioningError;

/// Nodo físico reservado de antemano, asociado a los SKUs de VM que puede
/// alojar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedSession {
    pub id: String,
    pub region: String,
    pub cluster_name: String,
    pub supported_skus: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_sku: Option<String>,
}

#[async_trait]
pub trait SessionClient: Send + Sync + Debug {
    /// `Ok(None)` si no existe una sesión con ese id.
    async fn get_session(&self, id: &str) -> Result<Option<ReservedSession>, ProvisioningError>;
}
