//! Tenant execution wrapper.
//!
//! Resolves `metadata.tenant_id`, binds the schema into the context handed to
//! the handler and releases it afterwards. An unknown tenant fails before the
//! handler runs.

use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use crate::domain::{EngineError, ExecutionContext, TenantSchema};
use crate::ports::{TenantDirectory, TenantScope};

pub struct TenantExecutor {
    directory: Arc<dyn TenantDirectory>,
    scope: Arc<dyn TenantScope>,
}

impl TenantExecutor {
    pub fn new(directory: Arc<dyn TenantDirectory>, scope: Arc<dyn TenantScope>) -> Self {
        Self { directory, scope }
    }

    pub async fn resolve(&self, tenant_id: &str) -> Result<TenantSchema, EngineError> {
        self.directory
            .resolve(tenant_id)
            .await?
            .ok_or_else(|| EngineError::TenantNotFound(tenant_id.to_string()))
    }

    /// Run `f` with `schema` bound. Release runs whatever `f` returns.
    pub async fn with_tenant_schema<F, Fut, T>(
        &self,
        base: &ExecutionContext,
        tenant_id: &str,
        schema: &TenantSchema,
        f: F,
    ) -> Result<T, EngineError>
    where
        F: FnOnce(ExecutionContext) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let scoped = self.scope.bind(base, tenant_id, schema).await?;
        let result = f(scoped.clone()).await;
        self.scope.release(&scoped).await;
        result
    }

    /// Resolve then run. Without a tenant id `f` gets `base` unchanged.
    pub async fn execute<F, Fut, T>(
        &self,
        base: ExecutionContext,
        tenant_id: Option<&str>,
        f: F,
    ) -> Result<T, EngineError>
    where
        F: FnOnce(ExecutionContext) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let Some(tenant_id) = tenant_id else {
            return f(base).await;
        };
        let schema = match self.resolve(tenant_id).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!(job_id = %base.job_id, tenant_id, error = %e, "tenant resolution failed");
                return Err(e);
            }
        };
        self.with_tenant_schema(&base, tenant_id, &schema, f).await
    }
}
