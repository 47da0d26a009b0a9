use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::StateKey;
use crate::errors::StateStoreError;

/// Get/set durable de blobs JSON opacos, con clave de identidad de step.
///
/// Contrato:
/// - `get_state` devuelve `Ok(None)` para una clave nunca guardada o borrada.
/// - `save_state` sobrescribe (gana el último escritor, sin concurrencia
///   optimista).
/// - `delete_state` sobre una clave inexistente no es error.
pub trait StateStore: Send + Sync {
    fn get_state(&self, key: &StateKey) -> Result<Option<Value>, StateStoreError>;
    fn save_state(&self, key: &StateKey, value: &Value) -> Result<(), StateStoreError>;
    fn delete_state(&self, key: &StateKey) -> Result<(), StateStoreError>;
}

/// Helpers tipados sobre cualquier `StateStore`.
pub trait StateStoreExt: StateStore {
    fn get_typed<T: DeserializeOwned>(&self, key: &StateKey) -> Result<Option<T>, StateStoreError> {
        match self.get_state(key)? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some)
                                                        .map_err(|e| StateStoreError::Serialization(format!("{key}: {e}"))),
        }
    }

    fn save_typed<T: Serialize>(&self, key: &StateKey, value: &T) -> Result<(), StateStoreError> {
        let json = serde_json::to_value(value).map_err(|e| StateStoreError::Serialization(format!("{key}: {e}")))?;
        self.save_state(key, &json)
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}

impl<S: StateStore + ?Sized> StateStore for std::sync::Arc<S> {
    fn get_state(&self, key: &StateKey) -> Result<Option<Value>, StateStoreError> {
        (**self).get_state(key)
    }
    fn save_state(&self, key: &StateKey, value: &Value) -> Result<(), StateStoreError> {
        (**self).save_state(key, value)
    }
    fn delete_state(&self, key: &StateKey) -> Result<(), StateStoreError> {
        (**self).delete_state(key)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    pub inner: DashMap<StateKey, Value>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl StateStore for InMemoryStateStore {
    fn get_state(&self, key: &StateKey) -> Result<Option<Value>, StateStoreError> {
        Ok(self.inner.get(key).map(|v| v.value().clone()))
    }

    fn save_state(&self, key: &StateKey, value: &Value) -> Result<(), StateStoreError> {
        self.inner.insert(key.clone(), value.clone());
        Ok(())
    }

    fn delete_state(&self, key: &StateKey) -> Result<(), StateStoreError> {
        self.inner.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateScope;
    use serde::Deserialize;
    use uuid::Uuid;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Progress {
        installed: bool,
        restarts: u32,
    }

    #[test]
    fn typed_round_trip_and_delete() {
        let store = InMemoryStateStore::new();
        let key = StateKey::new(Uuid::new_v4(), "worker", StateScope::State);
        assert_eq!(store.get_typed::<Progress>(&key).unwrap(), None);

        store.save_typed(&key, &Progress { installed: true, restarts: 2 }).unwrap();
        assert_eq!(store.get_typed::<Progress>(&key).unwrap(), Some(Progress { installed: true, restarts: 2 }));

        store.delete_state(&key).unwrap();
        assert!(store.is_empty());
        store.delete_state(&key).unwrap();
    }

    #[test]
    fn keys_are_scoped_per_step_and_experiment() {
        let store = InMemoryStateStore::new();
        let experiment = Uuid::new_v4();
        let a = StateKey::new(experiment, "a", StateScope::State);
        let b = StateKey::new(experiment, "b", StateScope::State);
        let other = StateKey::new(Uuid::new_v4(), "a", StateScope::State);
        store.save_state(&a, &serde_json::json!(1)).unwrap();
        assert!(store.get_state(&b).unwrap().is_none());
        assert!(store.get_state(&other).unwrap().is_none());
    }

    #[test]
    fn shape_mismatch_is_a_serialization_error() {
        let store = InMemoryStateStore::new();
        let key = StateKey::new(Uuid::new_v4(), "worker", StateScope::State);
        store.save_state(&key, &serde_json::json!("not an object")).unwrap();
        assert!(matches!(store.get_typed::<Progress>(&key), Err(StateStoreError::Serialization(_))));
    }
}
