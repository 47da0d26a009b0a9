//! Configuración del runner.
//!
//! - `FLEETFLOW_POLL_INTERVAL_SECS`: segundos entre ticks (default 10).
//! - `FLEETFLOW_MAX_TICKS`: parar tras esta cantidad de ticks (default sin
//!   límite).
//! - `DATABASE_URL`: state store Postgres; en memoria si no está.

use std::time::Duration;

use crate::error::FleetError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub poll_interval: Duration,
    pub max_ticks: Option<u64>,
    pub database_url: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { poll_interval: DEFAULT_POLL_INTERVAL,
               max_ticks: None,
               database_url: None }
    }
}

impl RunnerConfig {
    /// Lee el entorno del proceso después de cargar `.env`.
    pub fn from_env() -> Result<Self, FleetError> {
        fleet_persistence::init_dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, FleetError>
        where F: Fn(&str) -> Option<String>
    {
        let poll_interval = match lookup("FLEETFLOW_POLL_INTERVAL_SECS") {
            Some(raw) => Duration::from_secs(parse_number("FLEETFLOW_POLL_INTERVAL_SECS", &raw)?),
            None => DEFAULT_POLL_INTERVAL,
        };
        let max_ticks = match lookup("FLEETFLOW_MAX_TICKS") {
            Some(raw) => Some(parse_number("FLEETFLOW_MAX_TICKS", &raw)?).filter(|n| *n > 0),
            None => None,
        };
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        Ok(Self { poll_interval,
                  max_ticks,
                  database_url })
    }
}

fn parse_number(name: &str, raw: &str) -> Result<u64, FleetError> {
    raw.trim()
       .parse()
       .map_err(|_| FleetError::Config(format!("{name} must be a non-negative integer, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let cfg = RunnerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, RunnerConfig::default());
    }

    #[test]
    fn reads_all_variables() {
        let cfg = RunnerConfig::from_lookup(lookup(&[("FLEETFLOW_POLL_INTERVAL_SECS", "2"),
                                                     ("FLEETFLOW_MAX_TICKS", "40"),
                                                     ("DATABASE_URL", "postgres://fleet@localhost/fleet")])).unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.max_ticks, Some(40));
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://fleet@localhost/fleet"));
    }

    #[test]
    fn rejects_garbage_and_treats_zero_as_unlimited() {
        assert!(matches!(RunnerConfig::from_lookup(lookup(&[("FLEETFLOW_MAX_TICKS", "many")])),
                         Err(FleetError::Config(_))));
        let cfg = RunnerConfig::from_lookup(lookup(&[("FLEETFLOW_MAX_TICKS", "0"), ("DATABASE_URL", " ")])).unwrap();
        assert_eq!(cfg.max_ticks, None);
        assert_eq!(cfg.database_url, None);
    }
}
