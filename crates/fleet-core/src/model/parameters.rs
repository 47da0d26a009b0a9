//! Parámetros de step: mapa ordenado clave/valor con búsqueda
//! case-insensitive.
//!
//! Los valores llegan como JSON desde la definición del workflow, muchas
//! veces como strings aunque describan números, booleanos o duraciones; por
//! eso cada getter tipado acepta el tipo JSON nativo y su forma string. Una
//! clave requerida ausente o un valor no parseable es error de configuración.

use std::collections::BTreeMap;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StepError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepParameters {
    values: IndexMap<String, Value>,
}

impl StepParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construye los parámetros desde un objeto JSON.
    pub fn from_json(value: Value) -> Result<Self, StepError> {
        match value {
            Value::Object(map) => Ok(Self { values: map.into_iter().collect() }),
            Value::Null => Ok(Self::default()),
            other => Err(StepError::Configuration(format!("step parameters must be a JSON object, got {other}"))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserta o reemplaza, conservando la capitalización de una clave existente.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let existing = self.values.keys().find(|k| k.eq_ignore_ascii_case(&key)).cloned();
        self.values.insert(existing.unwrap_or(key), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
            .filter(|v| !is_blank(v))
    }

    /// Presente y no vacío (null o string vacío cuentan como ausentes).
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn require(&self, key: &str) -> Result<&Value, StepError> {
        self.get(key).ok_or_else(|| StepError::MissingParameter(key.to_string()))
    }

    pub fn validate_required(&self, keys: &[&str]) -> Result<(), StepError> {
        for key in keys {
            self.require(key)?;
        }
        Ok(())
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, StepError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(StepError::invalid_parameter(key, format!("expected a string, got {other}"))),
        }
    }

    pub fn require_string(&self, key: &str) -> Result<String, StepError> {
        self.get_string(key)?.ok_or_else(|| StepError::MissingParameter(key.to_string()))
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, StepError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" => Ok(Some(false)),
                _ => Err(StepError::invalid_parameter(key, format!("'{s}' is not a boolean"))),
            },
            Some(other) => Err(StepError::invalid_parameter(key, format!("expected a boolean, got {other}"))),
        }
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>, StepError> {
        let invalid = |raw: &dyn std::fmt::Display| {
            StepError::invalid_parameter(key, format!("'{raw}' is not a non-negative integer"))
        };
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n.as_u64()
                                       .and_then(|v| u32::try_from(v).ok())
                                       .map(Some)
                                       .ok_or_else(|| invalid(n)),
            Some(Value::String(s)) => s.trim().parse::<u32>().map(Some).map_err(|_| invalid(s)),
            Some(other) => Err(invalid(other)),
        }
    }

    pub fn get_duration(&self, key: &str) -> Result<Option<Duration>, StepError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n.as_u64()
                                       .map(|secs| Some(Duration::from_secs(secs)))
                                       .ok_or_else(|| StepError::invalid_parameter(key, format!("'{n}' is not a duration"))),
            Some(Value::String(s)) => parse_duration(s).map(Some)
                                                       .ok_or_else(|| StepError::invalid_parameter(key, format!("'{s}' is not a duration"))),
            Some(other) => Err(StepError::invalid_parameter(key, format!("expected a duration, got {other}"))),
        }
    }

    pub fn require_duration(&self, key: &str) -> Result<Duration, StepError> {
        self.get_duration(key)?.ok_or_else(|| StepError::MissingParameter(key.to_string()))
    }

    /// Lista dada como array JSON o como string separado por comas/punto y coma.
    /// Ausente equivale a vacía.
    pub fn get_list(&self, key: &str) -> Result<Vec<String>, StepError> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(s.split([',', ';'])
                                          .map(str::trim)
                                          .filter(|item| !item.is_empty())
                                          .map(str::to_string)
                                          .collect()),
            Some(Value::Array(items)) => items.iter()
                                              .map(|item| match item {
                                                  Value::String(s) => Ok(s.trim().to_string()),
                                                  other => Err(StepError::invalid_parameter(key, format!("list item {other} is not a string"))),
                                              })
                                              .filter(|item| !matches!(item, Ok(s) if s.is_empty()))
                                              .collect(),
            Some(other) => Err(StepError::invalid_parameter(key, format!("expected a list, got {other}"))),
        }
    }

    /// Mapa string→string dado como objeto JSON o como pares `k=v` separados por
    /// comas/punto y coma. Ausente equivale a vacío.
    pub fn get_string_map(&self, key: &str) -> Result<BTreeMap<String, String>, StepError> {
        match self.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Value::Object(map)) => Ok(map.iter()
                                              .map(|(k, v)| {
                                                  let v = match v {
                                                      Value::String(s) => s.clone(),
                                                      other => other.to_string(),
                                                  };
                                                  (k.clone(), v)
                                              })
                                              .collect()),
            Some(Value::String(s)) => s.split([',', ';'])
                                       .map(str::trim)
                                       .filter(|pair| !pair.is_empty())
                                       .map(|pair| {
                                           pair.split_once('=')
                                               .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                                               .ok_or_else(|| StepError::invalid_parameter(key, format!("'{pair}' is not a key=value pair")))
                                       })
                                       .collect(),
            Some(other) => Err(StepError::invalid_parameter(key, format!("expected an object, got {other}"))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Acepta `90`, `90s`, `15m`, `2h`, `1d`, `hh:mm:ss`, `d.hh:mm:ss` y
/// `hh:mm:ss.fff`. Un valor que desborda devuelve `None`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if !s.contains(':') {
        let unit_start = s.char_indices().last().map(|(i, _)| i)?;
        let (number, unit) = s.split_at(unit_start);
        let value: u64 = number.trim().parse().ok()?;
        let factor = match unit {
            "s" | "S" => 1,
            "m" | "M" => 60,
            "h" | "H" => 3600,
            "d" | "D" => 86_400,
            _ => return None,
        };
        return value.checked_mul(factor).map(Duration::from_secs);
    }

    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let (days, hours) = match parts[0].split_once('.') {
        Some((d, h)) => (d.parse::<u64>().ok()?, h.parse::<u64>().ok()?),
        None => (0, parts[0].parse::<u64>().ok()?),
    };
    let minutes: u64 = parts[1].parse().ok()?;
    let (seconds, millis) = match parts[2].split_once('.') {
        Some((sec, frac)) => {
            let mut frac = frac.to_string();
            frac.truncate(3);
            while frac.len() < 3 {
                frac.push('0');
            }
            (sec.parse::<u64>().ok()?, frac.parse::<u64>().ok()?)
        }
        None => (parts[2].parse::<u64>().ok()?, 0),
    };
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    let total = days.checked_mul(86_400)?
                    .checked_add(hours.checked_mul(3600)?)?
                    .checked_add(minutes * 60 + seconds)?;
    Duration::from_secs(total).checked_add(Duration::from_millis(millis))
}
