//! Job record and its lifecycle transitions.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::errors::EngineError;
use super::ids::JobId;
use super::outcome::JobError;
use super::state::JobStatus;

/// Metadata key carrying the tenant a job belongs to.
pub const TENANT_ID_KEY: &str = "tenant_id";

pub const DEFAULT_QUEUE: &str = "default";

/// Dequeue priority within a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Lanes in drain order, most urgent first.
    pub const DRAIN_ORDER: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Lane index; lower drains first.
    pub fn rank(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(EngineError::Validation(format!("unknown priority '{other}'"))),
        }
    }
}

/// What a producer submits. Everything else on [`Job`] is owned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInput {
    pub job_type: String,

    #[serde(default)]
    pub args: serde_json::Value,

    #[serde(default = "default_queue")]
    pub queue: String,

    #[serde(default)]
    pub priority: Priority,

    /// Falls back to the engine's configured default when absent.
    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

impl JobInput {
    pub fn new(job_type: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            args,
            queue: default_queue(),
            priority: Priority::default(),
            max_retries: None,
            metadata: HashMap::new(),
        }
    }

    pub fn on_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn for_tenant(self, tenant_id: impl Into<String>) -> Self {
        self.with_metadata(TENANT_ID_KEY, serde_json::Value::String(tenant_id.into()))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.job_type.trim().is_empty() {
            return Err(EngineError::Validation("job_type must not be empty".into()));
        }
        if self.queue.trim().is_empty() {
            return Err(EngineError::Validation("queue must not be empty".into()));
        }
        if let Some(tenant) = self.metadata.get(TENANT_ID_KEY)
            && !tenant.as_str().is_some_and(|t| !t.trim().is_empty())
        {
            return Err(EngineError::Validation(format!(
                "metadata.{TENANT_ID_KEY} must be a non-empty string"
            )));
        }
        Ok(())
    }
}

/// A status change requested from the job store.
///
/// Callers describe *what* happened; the job applies the state-machine rules,
/// timestamps and retry accounting itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Worker claimed the job and is about to invoke the handler.
    Running,
    Completed { result: Option<serde_json::Value> },
    /// Failure with retry budget left; run again after `delay`.
    Retrying { error: JobError, delay: Duration },
    Failed { error: JobError },
    /// Promotion of a retrying job back into its queue.
    Pending,
    Cancelled,
}

impl Transition {
    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Running => JobStatus::Running,
            Transition::Completed { .. } => JobStatus::Completed,
            Transition::Retrying { .. } => JobStatus::Retrying,
            Transition::Failed { .. } => JobStatus::Failed,
            Transition::Pending => JobStatus::Pending,
            Transition::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// The unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub args: serde_json::Value,
    pub queue: String,
    pub priority: Priority,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub execute_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<JobError>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Job {
    /// Build a fresh `pending` job. `input` must already be validated.
    pub fn new(
        id: JobId,
        input: JobInput,
        default_max_retries: u32,
        now: DateTime<Utc>,
        execute_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_type: input.job_type,
            args: input.args,
            queue: input.queue,
            priority: input.priority,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: input.max_retries.unwrap_or(default_max_retries),
            execute_at,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            metadata: input.metadata,
        }
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.metadata.get(TENANT_ID_KEY).and_then(|v| v.as_str())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.execute_at <= now
    }

    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Apply one transition. On error the job is left untouched.
    pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) -> Result<(), EngineError> {
        let to = transition.target();
        if !self.status.can_transition_to(to) {
            return Err(self.invalid(to));
        }
        match transition {
            Transition::Running => {
                self.started_at.get_or_insert(now);
            }
            Transition::Completed { result } => {
                self.result = result;
                self.error = None;
                self.completed_at = Some(now);
            }
            Transition::Retrying { error, delay } => {
                if !self.has_retries_left() {
                    return Err(self.invalid(to));
                }
                self.retry_count += 1;
                self.execute_at = add_delay(now, delay);
                self.error = Some(error);
            }
            Transition::Failed { error } => {
                self.error = Some(error);
            }
            Transition::Pending => {
                self.error = None;
            }
            Transition::Cancelled => {
                self.error = None;
            }
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Operator retry of a dead-lettered job: back to `pending`, due now.
    /// `retry_count` is kept; the operator re-runs the existing attempt ledger.
    pub fn resurrect(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if !self.status.can_resurrect() {
            return Err(self.invalid(JobStatus::Pending));
        }
        self.status = JobStatus::Pending;
        self.error = None;
        self.execute_at = now;
        self.updated_at = now;
        Ok(())
    }

    fn invalid(&self, to: JobStatus) -> EngineError {
        EngineError::InvalidTransition {
            id: self.id,
            from: self.status,
            to,
        }
    }
}

fn add_delay(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
