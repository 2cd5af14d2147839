//! In-process implementations of the ports.
//!
//! - **InMemoryJobQueue**: priority lanes + scheduled heap
//! - **InMemoryJobStore**: job records behind one lock
//! - **InMemoryTenantDirectory** / **ContextTenantScope**: tenant lookup and binding
//!
//! Durable backends implement the same traits in their own crates.

pub mod inmem_queue;
pub mod inmem_store;
pub mod tenant;

pub use self::inmem_queue::InMemoryJobQueue;
pub use self::inmem_store::InMemoryJobStore;
pub use self::tenant::{ContextTenantScope, InMemoryTenantDirectory};
