//! Engine error taxonomy.

use thiserror::Error;

use super::ids::JobId;
use super::state::JobStatus;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Malformed job input. Rejected at enqueue, never persisted.
    #[error("invalid job: {0}")]
    Validation(String),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// A handler's own failure (returned, not panicked).
    #[error("{0}")]
    Handler(String),

    #[error("payload decode failed: {0}")]
    Decode(String),

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("duplicate handler for job_type={0}")]
    DuplicateHandler(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A store or queue backend could not complete the call.
    #[error("backend unavailable: {0}")]
    Backend(String),
}

impl EngineError {
    pub fn handler(message: impl Into<String>) -> Self {
        EngineError::Handler(message.into())
    }

    /// Category name persisted as `error.type` on the job.
    pub fn kind_name(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "ValidationError",
            EngineError::NotFound(_) => "NotFoundError",
            EngineError::InvalidTransition { .. } => "InvalidTransitionError",
            EngineError::Handler(_) => "HandlerError",
            EngineError::Decode(_) => "DecodeError",
            EngineError::TenantNotFound(_) => "TenantNotFoundError",
            EngineError::DuplicateHandler(_) => "DuplicateHandlerError",
            EngineError::Config(_) => "ConfigError",
            EngineError::Backend(_) => "BackendError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn kind_name_matches_category() {
        assert_eq!(EngineError::handler("boom").kind_name(), "HandlerError");
        assert_eq!(
            EngineError::TenantNotFound("acme".into()).kind_name(),
            "TenantNotFoundError"
        );
    }

    #[test]
    fn invalid_transition_message_names_both_states() {
        let err = EngineError::InvalidTransition {
            id: JobId::from_ulid(Ulid::new()),
            from: JobStatus::Completed,
            to: JobStatus::Running,
        };
        assert!(err.to_string().ends_with("completed -> running"));
    }
}
