//! fleet-persistence
//!
//! Backend Postgres (Diesel) de `fleet_core::StateStore`, para que el estado y
//! los resultados de los steps sobrevivan reinicios del orquestador.
//!
//! Módulos:
//! - `pg`: `PgStateStore`, proveedores de conexión y construcción del pool.
//! - `migrations`: migraciones Diesel embebidas, corridas al construir el pool.
//! - `config`: configuración de conexión desde el entorno / `.env`.
//! - `schema`: declaración de tablas Diesel.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_pool, build_pool_from_env, ConnectionProvider, PgPool, PgStateStore, PoolProvider};
