//! Valores por defecto compartidos por el motor y los controladores.
//!
//! Son solo defaults: cada controlador lee el valor efectivo desde sus
//! parámetros de step.

use std::time::Duration;

/// Presupuesto de reinicios de un step de proceso si no se define `MaxRestarts`.
pub const DEFAULT_MAX_RESTARTS: u32 = 50;

/// Fallos consecutivos de aprovisionamiento tolerados si no se define
/// `MaximumConsecutiveFailure`.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Deadline de setup (instalación de dependencias + primer arranque).
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Deadline de una fase de creación o borrado de una iteración.
pub const DEFAULT_ITERATION_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Reintentos inmediatos para operaciones locales transitorias (kill del
/// proceso, escritura del archivo de especificación).
pub const LOCAL_RETRY_ATTEMPTS: u32 = 3;

/// Base del backoff lineal entre reintentos locales (15ms, 30ms, 45ms).
pub const LOCAL_RETRY_BASE_DELAY: Duration = Duration::from_millis(15);
