//! Handler traits.
//!
//! - `Handler<T>`: typed surface, one implementation per [`Task`] type
//! - `DynHandler`: object-safe form stored in the registry
//! - `TypedHandler<T, H>`: erases a `Handler<T>` into a `DynHandler`

use std::marker::PhantomData;

use async_trait::async_trait;

use super::task::Task;
use crate::domain::{EngineError, ExecutionContext, Outcome};

/// Executes one job of type `T`.
///
/// Expected failures are reported as `Ok(Outcome::failure(..))`. An `Err` or a
/// panic is treated the same way by the worker, with `error.type` taken from
/// the error category.
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T, ctx: &ExecutionContext) -> Result<Outcome, EngineError>;
}

/// Object-safe handler keyed by job type.
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(
        &self,
        args: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<Outcome, EngineError>;

    fn job_type(&self) -> &str;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(
        &self,
        args: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<Outcome, EngineError> {
        let task: T = serde_json::from_value(args).map_err(|e| EngineError::Decode(e.to_string()))?;
        self.handler.handle(task, ctx).await
    }

    fn job_type(&self) -> &str {
        T::TYPE
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::typed::task::fixtures::{AnotherTestTask, TestTask};

    pub struct TestTaskHandler;

    #[async_trait]
    impl Handler<TestTask> for TestTaskHandler {
        async fn handle(&self, task: TestTask, _ctx: &ExecutionContext) -> Result<Outcome, EngineError> {
            Ok(Outcome::success_with(serde_json::json!({ "value": task.value })))
        }
    }

    pub struct AnotherTestTaskHandler;

    #[async_trait]
    impl Handler<AnotherTestTask> for AnotherTestTaskHandler {
        async fn handle(
            &self,
            _task: AnotherTestTask,
            _ctx: &ExecutionContext,
        ) -> Result<Outcome, EngineError> {
            Ok(Outcome::success())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::TestTaskHandler;
    use super::*;
    use crate::domain::{Job, JobId, JobInput};
    use crate::typed::task::fixtures::TestTask;
    use chrono::Utc;
    use serde_json::json;
    use ulid::Ulid;

    fn ctx() -> ExecutionContext {
        let now = Utc::now();
        let job = Job::new(
            JobId::from_ulid(Ulid::new()),
            JobInput::new(TestTask::TYPE, json!({})),
            3,
            now,
            now,
        );
        ExecutionContext::for_job(&job)
    }

    #[tokio::test]
    async fn typed_handler_decodes_args() {
        let handler = TypedHandler::<TestTask, _>::new(TestTaskHandler);
        let outcome = handler.handle_dyn(json!({ "value": 100 }), &ctx()).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.result, Some(json!({ "value": 100 })));
        assert_eq!(handler.job_type(), TestTask::TYPE);
    }

    #[tokio::test]
    async fn undecodable_args_are_a_decode_error() {
        let handler = TypedHandler::<TestTask, _>::new(TestTaskHandler);
        let err = handler
            .handle_dyn(json!({ "value": "not a number" }), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "DecodeError");
    }
}
