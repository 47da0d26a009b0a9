//! Configuración de conexión desde variables de entorno.
//! `DATABASE_URL` es obligatoria; los tamaños del pool son opcionales.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

// `.env` se carga como máximo una vez; si no existe no pasa nada.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL is not set".into()))?;
        Ok(Self { url,
                  min_connections: env_u32("DATABASE_MIN_CONNECTIONS").unwrap_or(1),
                  max_connections: env_u32("DATABASE_MAX_CONNECTIONS").unwrap_or(8) })
    }
}

fn env_u32(name: &str) -> Option<u32> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Carga `.env` temprano para quien lea otras variables antes.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
