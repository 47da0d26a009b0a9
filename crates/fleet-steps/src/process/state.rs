use chrono::{DateTime, Utc};
use fleet_core::Deadline;
use serde::{Deserialize, Serialize};

/// Se persiste entre ticks del step de proceso worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessState {
    /// Deadline de setup: instalación + primer arranque confirmado.
    pub step_timeout: Deadline,
    pub dependencies_installed: bool,
    pub process_running: bool,
    #[serde(default)]
    pub process_id: Option<u32>,
    #[serde(default)]
    pub process_name: Option<String>,
    /// Se fija en el primer arranque confirmado y se conserva entre reinicios.
    #[serde(default)]
    pub process_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub restart_count: u32,
}

impl ProcessState {
    pub fn new(step_timeout: Deadline) -> Self {
        Self { step_timeout,
               dependencies_installed: false,
               process_running: false,
               process_id: None,
               process_name: None,
               process_end_time: None,
               restart_count: 0 }
    }

    /// El worker se confirmó corriendo al menos una vez.
    pub fn has_started(&self) -> bool {
        self.process_end_time.is_some()
    }

    pub fn duration_expired(&self, now: DateTime<Utc>) -> bool {
        self.process_end_time.is_some_and(|end| now >= end)
    }
}
