//! Reintento acotado con backoff lineal corto para operaciones locales
//! transitorias.
//!
//! Política:
//! - `attempts` intentos en total.
//! - Backoff: `base`, `2 * base`, `3 * base`, ...
//! - Un `warn!` por cada intento fallido que se va a reintentar.
//! - Los errores para los que `is_retryable` devuelve `false` se devuelven de
//!   inmediato.

use std::future::Future;
use std::time::Duration;

use log::warn;

pub async fn with_retry<T, E, F, Fut, R>(operation: &str,
                                         attempts: u32,
                                         base: Duration,
                                         is_retryable: R,
                                         mut f: F)
                                         -> Result<T, E>
    where F: FnMut() -> Fut,
          Fut: Future<Output = Result<T, E>>,
          R: Fn(&E) -> bool,
          E: std::fmt::Display
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match f().await {
            Err(e) if attempt < attempts && is_retryable(&e) => {
                let delay = base * attempt;
                warn!("retryable error op={operation} attempt={attempt}/{attempts} err={e} sleeping={}ms",
                      delay.as_millis());
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            r => return r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, String> = with_retry("op", 3, Duration::from_millis(1), |_| true, || {
                                           let n = calls.fetch_add(1, Ordering::SeqCst);
                                           async move { if n < 2 { Err("busy".to_string()) } else { Ok(n) } }
                                       }).await;
        assert_eq!(out, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_budget() {
        let calls = AtomicU32::new(0);
        let out: Result<(), String> = with_retry("op", 3, Duration::from_millis(1), |_| true, || {
                                          calls.fetch_add(1, Ordering::SeqCst);
                                          async { Err("still busy".to_string()) }
                                      }).await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let out: Result<(), String> = with_retry("op", 5, Duration::from_millis(1), |e: &String| e != "fatal", || {
                                          calls.fetch_add(1, Ordering::SeqCst);
                                          async { Err("fatal".to_string()) }
                                      }).await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
