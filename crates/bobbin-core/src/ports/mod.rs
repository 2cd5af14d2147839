//! Ports: the seams between the engine and its collaborators.
//!
//! Storage, queueing, time, id generation and tenant lookup are traits so the
//! in-memory implementations in `impls` can be swapped for real backends.

pub mod clock;
pub mod id_generator;
pub mod job_queue;
pub mod job_store;
pub mod tenant;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_queue::JobQueue;
pub use self::job_store::{JobFilter, JobStore, StatusCounts};
pub use self::tenant::{TenantDirectory, TenantScope};
