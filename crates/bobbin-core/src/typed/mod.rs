//! Typed handler API.
//!
//! Two layers:
//! - **Typed**: `Task` + `Handler<T>`; a job type typo is a compile error
//! - **Dyn**: `DynHandler`, object-safe, what the registry and workers see

pub mod handler;
pub mod registry;
pub mod task;

pub use self::handler::{DynHandler, Handler, TypedHandler};
pub use self::registry::{HandlerRegistry, RegistryError};
pub use self::task::Task;
