//! In-memory tenant directory and the default schema scope.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{EngineError, ExecutionContext, TenantSchema};
use crate::ports::{TenantDirectory, TenantScope};

/// Static tenant-to-schema map, filled at startup or by tests.
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    tenants: RwLock<HashMap<String, TenantSchema>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(self, tenant_id: impl Into<String>, schema: impl Into<String>) -> Self {
        self.insert(tenant_id, schema);
        self
    }

    pub fn insert(&self, tenant_id: impl Into<String>, schema: impl Into<String>) {
        let mut tenants = self.tenants.write().unwrap_or_else(|e| e.into_inner());
        tenants.insert(tenant_id.into(), TenantSchema::new(schema));
    }

    pub fn remove(&self, tenant_id: &str) -> Option<TenantSchema> {
        let mut tenants = self.tenants.write().unwrap_or_else(|e| e.into_inner());
        tenants.remove(tenant_id)
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn resolve(&self, tenant_id: &str) -> Result<Option<TenantSchema>, EngineError> {
        let tenants = self.tenants.read().unwrap_or_else(|e| e.into_inner());
        Ok(tenants.get(tenant_id).cloned())
    }
}

/// Binds the schema into the context value and nothing else.
///
/// The handler receives a fresh context; the base context is never mutated,
/// so release has nothing to undo.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextTenantScope;

#[async_trait]
impl TenantScope for ContextTenantScope {
    async fn bind(
        &self,
        base: &ExecutionContext,
        tenant_id: &str,
        schema: &TenantSchema,
    ) -> Result<ExecutionContext, EngineError> {
        debug!(job_id = %base.job_id, tenant_id, schema = %schema.schema_name, "binding tenant schema");
        Ok(base.bound_to(tenant_id, schema.clone()))
    }

    async fn release(&self, scoped: &ExecutionContext) {
        debug!(job_id = %scoped.job_id, "released tenant schema");
    }
}
