//! bobbin-core
//!
//! Background job engine: priority queues, scheduled retries with backoff,
//! a dead-letter store and tenant-scoped execution.
//!
//! # Modules
//! - **domain**: jobs, state machine, outcomes, retry policy, decisions
//! - **ports**: store, queue, clock, id and tenant traits
//! - **impls**: in-memory implementations of the ports
//! - **typed**: `Task` + `Handler<T>` API and the handler registry
//! - **app**: `EngineBuilder`, `Engine`, worker pool, promoter
//! - **config**: `EngineConfig`
//! - **observability**: tracing subscriber setup

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod typed;

pub use app::{Engine, EngineBuilder};
pub use config::EngineConfig;
