//! HandlerRegistry: job type -> handler.
//!
//! Filled during startup (mutable), then shared read-only with every worker
//! behind an `Arc`, so lookups take no lock.
//!
//! # Invariants
//! - one handler per job type; a second registration is an error, never an
//!   overwrite
//! - typed handlers are keyed by `Task::TYPE`, dyn handlers by
//!   `DynHandler::job_type()`
//! - `get()` hands out a cloned `Arc`, so a worker keeps its handler even
//!   while other workers look up the same type
//!
//! # Example
//! ```ignore
//! let mut registry = HandlerRegistry::new();
//! registry.register::<SendEmail, _>(Mailer::new())?;
//! let handler = registry.get("send-email").expect("registered above");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::Task;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler for job type '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register_dyn(Arc::new(TypedHandler::<T, H>::new(handler)))
    }

    /// Register an untyped handler under its own [`DynHandler::job_type`].
    pub fn register_dyn(&mut self, handler: Arc<dyn DynHandler>) -> Result<(), RegistryError> {
        let job_type = handler.job_type().to_string();
        if self.handlers.contains_key(&job_type) {
            return Err(RegistryError::AlreadyRegistered(job_type));
        }
        self.handlers.insert(job_type, handler);
        Ok(())
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::handler::fixtures::{AnotherTestTaskHandler, TestTaskHandler};
    use crate::typed::task::fixtures::{AnotherTestTask, TestTask};

    #[test]
    fn register_and_get() {
        let mut registry = HandlerRegistry::new();
        registry.register::<TestTask, _>(TestTaskHandler).unwrap();

        let handler = registry.get(TestTask::TYPE).expect("registered");
        assert_eq!(handler.job_type(), TestTask::TYPE);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register::<TestTask, _>(TestTaskHandler).unwrap();
        let result = registry.register::<TestTask, _>(TestTaskHandler);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(t)) if t == TestTask::TYPE));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registered_types_are_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register::<TestTask, _>(TestTaskHandler).unwrap();
        registry
            .register::<AnotherTestTask, _>(AnotherTestTaskHandler)
            .unwrap();
        assert_eq!(
            registry.registered_types(),
            vec![AnotherTestTask::TYPE.to_string(), TestTask::TYPE.to_string()]
        );
    }
}
