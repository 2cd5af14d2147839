//! Tenant ports: directory lookup and schema scoping.

use async_trait::async_trait;

use crate::domain::{EngineError, ExecutionContext, TenantSchema};

/// Resolves a tenant id to the schema its data lives in.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn resolve(&self, tenant_id: &str) -> Result<Option<TenantSchema>, EngineError>;
}

/// Binds a schema into an execution context for one call.
///
/// `bind` returns the scoped context; `release` is called exactly once
/// afterwards whether the call succeeded or not. Backends holding a pooled
/// connection reset it to the default schema in `release`.
#[async_trait]
pub trait TenantScope: Send + Sync {
    async fn bind(
        &self,
        base: &ExecutionContext,
        tenant_id: &str,
        schema: &TenantSchema,
    ) -> Result<ExecutionContext, EngineError>;

    async fn release(&self, scoped: &ExecutionContext);
}
