//! Outcome model: what a handler reports back to the worker.

use serde::{Deserialize, Serialize};

use super::errors::EngineError;

/// Structured failure record persisted on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,

    /// Error category, e.g. `HandlerError`, `Panic`, `TenantNotFoundError`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl JobError {
    pub fn new(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
        }
    }
}

impl From<&EngineError> for JobError {
    fn from(err: &EngineError) -> Self {
        JobError::new(err.to_string(), err.kind_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Result of one handler invocation.
///
/// - `SUCCESS` carries an optional result payload stored on the job.
/// - `FAILURE` carries the error and goes through retry/dead-letter policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            kind: OutcomeKind::Success,
            result: None,
            error: None,
        }
    }

    pub fn success_with(result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            ..Self::success()
        }
    }

    /// Reported failure with the default `HandlerError` category.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::failure_of(message, "HandlerError")
    }

    pub fn failure_of(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            result: None,
            error: Some(JobError::new(message, kind)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    /// Error to persist for a failure. A failure without an explicit error
    /// still gets a record so the job never ends up `failed` without detail.
    pub fn error_or_default(&self) -> JobError {
        self.error
            .clone()
            .unwrap_or_else(|| JobError::new("handler reported failure", "HandlerError"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_error_serializes_kind_as_type() {
        let v = serde_json::to_value(JobError::new("smtp timeout", "HandlerError")).unwrap();
        assert_eq!(v["message"], "smtp timeout");
        assert_eq!(v["type"], "HandlerError");
    }

    #[test]
    fn outcome_kind_serializes_upper_case() {
        let s = serde_json::to_string(&OutcomeKind::Failure).unwrap();
        assert_eq!(s, "\"FAILURE\"");
    }

    #[test]
    fn failure_without_error_gets_default_record() {
        let o = Outcome {
            kind: OutcomeKind::Failure,
            result: None,
            error: None,
        };
        assert_eq!(o.error_or_default().kind, "HandlerError");
    }

    #[test]
    fn success_omits_error_field() {
        let v = serde_json::to_value(Outcome::success_with(serde_json::json!({"sent": true})))
            .unwrap();
        assert_eq!(v["result"]["sent"], true);
        assert!(v.get("error").is_none());
    }
}
