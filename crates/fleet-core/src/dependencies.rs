//! Singletons de proceso compartidos por los steps (file system, reloj, ...).
//!
//! `ResumableStep::configure_dependencies` registra lo que necesita un step
//! con semántica register-if-absent: llamarlo de nuevo, o desde otra
//! instancia, nunca reemplaza un singleton existente. Los tests registran sus
//! fakes primero y los defaults del step se ignoran.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;

use crate::errors::StepError;

#[derive(Default)]
pub struct DependencyRegistry {
    entries: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra `value` salvo que ya exista una entrada del mismo tipo.
    /// Devuelve `true` si se insertó.
    pub fn register_if_absent<T>(&self, value: T) -> bool
        where T: Clone + Send + Sync + 'static
    {
        let mut inserted = false;
        self.entries.entry(TypeId::of::<T>()).or_insert_with(|| {
                                                  inserted = true;
                                                  Arc::new(value)
                                              });
        inserted
    }

    /// Igual que `register_if_absent` pero solo construye el valor si hace falta.
    pub fn register_with<T, F>(&self, build: F) -> bool
        where T: Clone + Send + Sync + 'static,
              F: FnOnce() -> T
    {
        let mut inserted = false;
        self.entries.entry(TypeId::of::<T>()).or_insert_with(|| {
                                                  inserted = true;
                                                  Arc::new(build())
                                              });
        inserted
    }

    /// Reemplaza sin condiciones la entrada de tipo `T`.
    pub fn register<T>(&self, value: T)
        where T: Clone + Send + Sync + 'static
    {
        self.entries.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T>(&self) -> Option<T>
        where T: Clone + Send + Sync + 'static
    {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().downcast_ref::<T>().cloned())
    }

    /// Como `get`, pero un registro ausente es un error interno: significa que
    /// se saltó `configure_dependencies`.
    pub fn resolve<T>(&self) -> Result<T, StepError>
        where T: Clone + Send + Sync + 'static
    {
        self.get::<T>().ok_or_else(|| {
                            StepError::Internal(format!("dependency {} is not registered",
                                                        std::any::type_name::<T>()))
                        })
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for DependencyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyRegistry").field("entries", &self.entries.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock, SystemClock};
    use chrono::Utc;

    #[test]
    fn first_registration_wins() {
        let registry = DependencyRegistry::new();
        let fake: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        assert!(registry.register_if_absent(fake.clone()));
        assert!(!registry.register_if_absent::<Arc<dyn Clock>>(Arc::new(SystemClock)));

        let resolved = registry.resolve::<Arc<dyn Clock>>().expect("clock");
        assert!(Arc::ptr_eq(&resolved, &fake));
    }

    #[test]
    fn missing_dependency_is_internal_error() {
        let registry = DependencyRegistry::new();
        let err = registry.resolve::<Arc<dyn Clock>>().unwrap_err();
        assert!(matches!(err, StepError::Internal(_)));
    }
}
