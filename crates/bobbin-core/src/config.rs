//! Engine configuration.
//!
//! Read from a JSON file; every field has a default so `{}` is a valid
//! config. `BOBBIN_*` environment variables override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_QUEUE, EngineError, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Idle sleep between polls of an empty queue.
    pub poll_interval_ms: u64,

    /// Period of the scheduled-set promoter.
    pub promote_interval_ms: u64,

    /// Grace period for in-flight handlers on pool shutdown.
    pub shutdown_timeout_ms: u64,

    /// Workers per pool.
    pub workers: usize,

    /// Queues a pool polls, in the order given.
    pub queues: Vec<String>,

    /// `max_retries` for jobs that do not set one.
    pub default_max_retries: u32,

    /// Reject enqueue of job types without a registered handler.
    pub strict_handlers: bool,

    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            promote_interval_ms: 5_000,
            shutdown_timeout_ms: 30_000,
            workers: 4,
            queues: vec![DEFAULT_QUEUE.to_string()],
            default_max_retries: 3,
            strict_handlers: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON file and apply environment overrides.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_json_str(&raw)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `BOBBIN_*` overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, EngineError> {
            raw.trim()
                .parse()
                .map_err(|_| EngineError::Config(format!("{key}: cannot parse '{raw}'")))
        }

        if let Some(v) = lookup("BOBBIN_WORKERS") {
            self.workers = parse("BOBBIN_WORKERS", &v)?;
        }
        if let Some(v) = lookup("BOBBIN_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse("BOBBIN_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("BOBBIN_PROMOTE_INTERVAL_MS") {
            self.promote_interval_ms = parse("BOBBIN_PROMOTE_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("BOBBIN_SHUTDOWN_TIMEOUT_MS") {
            self.shutdown_timeout_ms = parse("BOBBIN_SHUTDOWN_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("BOBBIN_QUEUES") {
            self.queues = v
                .split(',')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("BOBBIN_STRICT_HANDLERS") {
            self.strict_handlers = parse("BOBBIN_STRICT_HANDLERS", &v)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.workers == 0 {
            return Err(EngineError::Config("workers must be positive".into()));
        }
        if self.queues.is_empty() || self.queues.iter().any(|q| q.trim().is_empty()) {
            return Err(EngineError::Config("queues must be non-empty names".into()));
        }
        if self.poll_interval_ms == 0 || self.promote_interval_ms == 0 {
            return Err(EngineError::Config("intervals must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.retry.jitter) {
            return Err(EngineError::Config("retry.jitter must be in [0, 1)".into()));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(EngineError::Config(
                "retry.initial_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn promote_interval(&self) -> Duration {
        Duration::from_millis(self.promote_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
