//! Implementación Postgres (Diesel) de `fleet_core::StateStore`.
//!
//! Una fila por `(experiment_id, step_id, scope)`; guardar hace upsert del
//! payload JSON, así que la tabla tiene el último estado y el último resultado
//! de cada instancia de step y nada más.
//!
//! Los errores transitorios (checkout del pool, conflictos de serialización,
//! desconexiones) se reintentan unas pocas veces con backoff corto antes de
//! salir como `StateStoreError::Backend`.

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::upsert::excluded;
use fleet_core::{StateKey, StateStore, StateStoreError};
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::step_state;

/// Pool r2d2 de conexiones Postgres. Al construirlo se corren las migraciones
/// pendientes.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor de conexiones; permite que los tests inyecten su propio pool.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = step_state)]
struct NewStateRow<'a> {
    experiment_id: &'a Uuid,
    step_id: &'a str,
    scope: &'a str,
    payload: &'a Value,
}

/// Hasta 3 reintentos de errores transitorios, durmiendo 15ms, 30ms, 45ms.
fn with_retry<F, T>(operation: &str, mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0u64;
    loop {
        match f() {
            Err(e) if e.is_retryable() && attempts < 3 => {
                let delay_ms = 15 * (attempts + 1);
                warn!("retryable error op={operation} attempt={} err={e} sleeping={delay_ms}ms", attempts + 1);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

pub struct PgStateStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgStateStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl PgStateStore<PoolProvider> {
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(PoolProvider { pool })
    }
}

impl<P: ConnectionProvider> StateStore for PgStateStore<P> {
    fn get_state(&self, key: &StateKey) -> Result<Option<Value>, StateStoreError> {
        let payload = with_retry("get_state", || {
            let mut conn = self.provider.connection()?;
            step_state::table.filter(step_state::experiment_id.eq(key.experiment_id))
                             .filter(step_state::step_id.eq(key.step_id.as_str()))
                             .filter(step_state::scope.eq(key.scope.as_str()))
                             .select(step_state::payload)
                             .first::<Value>(&mut conn)
                             .optional()
                             .map_err(PersistenceError::from)
        })?;
        debug!("get_state key={key} found={}", payload.is_some());
        Ok(payload)
    }

    fn save_state(&self, key: &StateKey, value: &Value) -> Result<(), StateStoreError> {
        let row = NewStateRow { experiment_id: &key.experiment_id,
                                step_id: &key.step_id,
                                scope: key.scope.as_str(),
                                payload: value };
        with_retry("save_state", || {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(step_state::table).values(&row)
                                                  .on_conflict((step_state::experiment_id,
                                                                step_state::step_id,
                                                                step_state::scope))
                                                  .do_update()
                                                  .set((step_state::payload.eq(excluded(step_state::payload)),
                                                        step_state::updated_at.eq(diesel::dsl::now)))
                                                  .execute(&mut conn)
                                                  .map_err(PersistenceError::from)
        })?;
        debug!("save_state key={key}");
        Ok(())
    }

    fn delete_state(&self, key: &StateKey) -> Result<(), StateStoreError> {
        let deleted = with_retry("delete_state", || {
            let mut conn = self.provider.connection()?;
            diesel::delete(step_state::table.filter(step_state::experiment_id.eq(key.experiment_id))
                                            .filter(step_state::step_id.eq(key.step_id.as_str()))
                                            .filter(step_state::scope.eq(key.scope.as_str())))
                .execute(&mut conn)
                .map_err(PersistenceError::from)
        })?;
        debug!("delete_state key={key} rows={deleted}");
        Ok(())
    }
}

/// Construye el pool y aplica las migraciones pendientes en el primer
/// checkout.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let max_size = max_size.max(1);
    let min_size = min_size.max(1);
    if min_size > max_size {
        warn!("pool min_size > max_size ({min_size} > {max_size}), using min=max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min_size.min(max_size)))
                                    .max_size(max_size)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
