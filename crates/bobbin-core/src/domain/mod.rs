//! Domain model: jobs, their state machine, outcomes and retry decisions.
//!
//! Nothing here touches queues, storage or the async runtime; the ports and
//! app layers build on these types.

pub mod context;
pub mod decision;
pub mod errors;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod retry;
pub mod state;

pub use context::{ExecutionContext, TenantBinding, TenantSchema};
pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::EngineError;
pub use ids::JobId;
pub use job::{DEFAULT_QUEUE, Job, JobInput, Priority, TENANT_ID_KEY, Transition};
pub use outcome::{JobError, Outcome, OutcomeKind};
pub use retry::RetryPolicy;
pub use state::JobStatus;
