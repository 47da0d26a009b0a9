//! Resolución de referencias a secretos en los parámetros de step.
//!
//! Una referencia tiene la forma `[secret:NAME]`. Los valores resueltos solo
//! se entregan al llamador; deben ofuscarse antes de llegar a cualquier log.

use std::fmt::Debug;

use async_trait::async_trait;
use fleet_core::CancellationToken;
use thiserror::Error;

const REFERENCE_PREFIX: &str = "[secret:";
const REFERENCE_SUFFIX: &str = "]";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("'{0}' is not a secret reference")]
    InvalidReference(String),
    #[error("secret '{0}' not found")]
    NotFound(String),
    #[error("secret resolution cancelled")]
    Cancelled,
}

#[async_trait]
pub trait SecretResolver: Send + Sync + Debug {
    fn is_secret_reference(&self, value: &str) -> bool {
        secret_name(value).is_some()
    }

    async fn resolve_secret(&self, reference: &str, cancellation: &CancellationToken) -> Result<String, SecretError>;
}

/// `NAME` a partir de `[secret:NAME]`.
pub fn secret_name(reference: &str) -> Option<&str> {
    reference.trim()
             .strip_prefix(REFERENCE_PREFIX)
             .and_then(|rest| rest.strip_suffix(REFERENCE_SUFFIX))
             .map(str::trim)
             .filter(|name| !name.is_empty())
}

/// Lee `[secret:NAME]` desde la variable de entorno `NAME`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretResolver;

#[async_trait]
impl SecretResolver for EnvSecretResolver {
    async fn resolve_secret(&self, reference: &str, cancellation: &CancellationToken) -> Result<String, SecretError> {
        if cancellation.is_cancelled() {
            return Err(SecretError::Cancelled);
        }
        let name = secret_name(reference).ok_or_else(|| SecretError::InvalidReference(reference.to_string()))?;
        std::env::var(name).map_err(|_| SecretError::NotFound(name.to_string()))
    }
}
