//! Task trait: binds a Rust payload type to a job type name.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Typed job payload.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct SendEmail {
///     to: String,
/// }
///
/// impl Task for SendEmail {
///     const TYPE: &'static str = "send-email";
/// }
/// ```
///
/// `DeserializeOwned` because the payload is decoded from the stored JSON
/// args; `'static` so the erased handler can live in an `Arc`.
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use super::Task;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TestTask {
        pub value: i32,
    }

    impl Task for TestTask {
        const TYPE: &'static str = "test.task.create.v1";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AnotherTestTask {
        pub name: String,
        pub family: HashMap<String, String>,
    }

    impl Task for AnotherTestTask {
        const TYPE: &'static str = "test.task.another.v1";
    }
}
