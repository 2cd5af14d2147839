//! App layer: wires the ports into a running engine.
//!
//! # Components
//! - **EngineBuilder**: wiring and startup validation
//! - **Engine**: enqueue, inspect and operate on jobs
//! - **WorkerPool**: dequeue, run, settle (`worker_loop`)
//! - **PromoterHandle**: scheduled-set promotion on a timer
//! - **TenantExecutor**: schema binding around tenant-scoped handlers
//! - **StatsAggregator**: per-queue attempt counters

pub mod builder;
pub mod engine;
pub mod promoter_loop;
pub mod stats;
pub mod tenant_wrapper;
pub mod worker_loop;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::engine::Engine;
pub use self::promoter_loop::PromoterHandle;
pub use self::stats::{QueueStats, StatsAggregator};
pub use self::tenant_wrapper::TenantExecutor;
pub use self::worker_loop::{ABORTED, ShutdownReport, WorkStep, WorkerPool};
