//! EngineBuilder: wiring and startup validation.
//!
//! Every collaborator has an in-memory default; tests swap in a `FixedClock`
//! and production swaps in durable store and queue backends.
//!
//! # Fail-fast
//! - `expect_job_types()` declares the job types this process must handle
//! - `build()` checks that every expected type has a registered handler
//! - configuration is validated before anything is spawned

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::domain::{Decider, DefaultDecider, EngineError};
use crate::impls::{ContextTenantScope, InMemoryJobQueue, InMemoryJobStore, InMemoryTenantDirectory};
use crate::ports::{Clock, JobQueue, JobStore, SystemClock, TenantDirectory, TenantScope, UlidGenerator};
use crate::typed::{DynHandler, Handler, HandlerRegistry, RegistryError, Task};

use super::engine::Engine;

/// ```ignore
/// let engine = EngineBuilder::new()
///     .with_config(config)
///     .register::<SendEmail, _>(Mailer::new())?
///     .expect_job_types(&["send-email"])
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    registry: HandlerRegistry,
    expected_job_types: Option<Vec<String>>,
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn JobStore>>,
    queue: Option<Arc<dyn JobQueue>>,
    tenant_directory: Option<Arc<dyn TenantDirectory>>,
    tenant_scope: Option<Arc<dyn TenantScope>>,
    decider: Option<Arc<dyn Decider>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing job types: {0:?}. These job types were expected but no handler is registered.")]
    MissingJobTypes(Vec<String>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] EngineError),
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// Register a raw JSON handler.
    pub fn register_dyn(mut self, handler: Arc<dyn DynHandler>) -> Result<Self, RegistryError> {
        self.registry.register_dyn(handler)?;
        Ok(self)
    }

    pub fn expect_job_types(mut self, job_types: &[&str]) -> Self {
        self.expected_job_types = Some(job_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_tenant_directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.tenant_directory = Some(directory);
        self
    }

    pub fn with_tenant_scope(mut self, scope: Arc<dyn TenantScope>) -> Self {
        self.tenant_scope = Some(scope);
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        if let Some(expected) = &self.expected_job_types {
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !self.registry.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingJobTypes(missing));
            }
        }
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryJobStore::new(Arc::clone(&clock))));
        let queue = self.queue.unwrap_or_else(|| Arc::new(InMemoryJobQueue::new()));
        let directory = self
            .tenant_directory
            .unwrap_or_else(|| Arc::new(InMemoryTenantDirectory::new()));
        let scope = self.tenant_scope.unwrap_or_else(|| Arc::new(ContextTenantScope));
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::new(self.config.retry.clone())));
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));

        Ok(Engine::new(
            self.config,
            self.registry,
            store,
            queue,
            clock,
            ids,
            directory,
            scope,
            decider,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::handler::fixtures::TestTaskHandler;
    use crate::typed::task::fixtures::{AnotherTestTask, TestTask};

    #[test]
    fn build_success() {
        let engine = EngineBuilder::new()
            .register::<TestTask, _>(TestTaskHandler)
            .unwrap()
            .expect_job_types(&[TestTask::TYPE])
            .build();
        assert!(engine.is_ok());
    }

    #[test]
    fn build_missing_job_types() {
        let engine = EngineBuilder::new()
            .register::<TestTask, _>(TestTaskHandler)
            .unwrap()
            .expect_job_types(&[TestTask::TYPE, AnotherTestTask::TYPE])
            .build();
        assert!(matches!(
            engine,
            Err(BuildError::MissingJobTypes(missing)) if missing == vec![AnotherTestTask::TYPE.to_string()]
        ));
    }

    #[test]
    fn build_without_expectations() {
        assert!(EngineBuilder::new().build().is_ok());
    }

    #[test]
    fn duplicate_registration_fails() {
        let res = EngineBuilder::new()
            .register::<TestTask, _>(TestTaskHandler)
            .unwrap()
            .register::<TestTask, _>(TestTaskHandler);
        assert!(matches!(res, Err(RegistryError::AlreadyRegistered(_))));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            workers: 0,
            ..EngineConfig::default()
        };
        let res = EngineBuilder::new().with_config(config).build();
        assert!(matches!(res, Err(BuildError::Config(EngineError::Config(_)))));
    }
}
