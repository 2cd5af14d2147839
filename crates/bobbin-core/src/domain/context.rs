//! Execution context handed to handlers.
//!
//! Tenant scope travels here as an explicit value rather than a thread-local,
//! so concurrent workers never observe each other's bindings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::job::Job;

/// Namespace a tenant's data lives in, as resolved by the tenant directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantSchema {
    pub schema_name: String,
}

impl TenantSchema {
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
        }
    }
}

/// Tenant bound into a context for the duration of one handler call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantBinding {
    pub tenant_id: String,
    pub schema: TenantSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub job_id: JobId,
    pub job_type: String,
    pub queue: String,

    /// Retries consumed before this attempt.
    pub retry_count: u32,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// `None` is the default, non-tenant scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<TenantBinding>,
}

impl ExecutionContext {
    /// Default-scope context for a job.
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type.clone(),
            queue: job.queue.clone(),
            retry_count: job.retry_count,
            metadata: job.metadata.clone(),
            tenant: None,
        }
    }

    /// Copy of this context bound to a tenant schema. `self` is left as is.
    pub fn bound_to(&self, tenant_id: impl Into<String>, schema: TenantSchema) -> Self {
        Self {
            tenant: Some(TenantBinding {
                tenant_id: tenant_id.into(),
                schema,
            }),
            ..self.clone()
        }
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.tenant.as_ref().map(|t| t.schema.schema_name.as_str())
    }
}
