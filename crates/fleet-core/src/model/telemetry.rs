//! Propiedades de correlación que acompañan cada línea de log.
//!
//! Se renderizan como pares `key=value` planos (ordenados por clave) para
//! poder filtrar los logs por experimento o step.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::StepContext;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryContext {
    properties: BTreeMap<String, Value>,
}

impl TelemetryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contexto con la identidad del step ya cargada.
    pub fn for_step(context: &StepContext) -> Self {
        Self::new().with("experimentId", context.experiment_id.to_string())
                   .with("stepId", context.step_id.clone())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

impl fmt::Display for TelemetryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.properties {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match v {
                Value::String(s) => write!(f, "{k}={s}")?,
                other => write!(f, "{k}={other}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn renders_sorted_pairs() {
        let t = TelemetryContext::new().with("tick", 3).with("attempt", "a");
        assert_eq!(t.to_string(), "attempt=a tick=3");
    }

    #[test]
    fn step_context_properties() {
        let ctx = StepContext::new(Uuid::nil(), "worker");
        let t = TelemetryContext::for_step(&ctx);
        assert_eq!(t.get("stepId"), Some(&Value::from("worker")));
    }
}
