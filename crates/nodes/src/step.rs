//! The durable unit-of-work contract executors perform side effects through.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::NodeError;

/// A re-invocable step body producing a JSON result.
///
/// `FnMut` because a retrying runner calls it once per attempt.
pub type StepFn<'a> = Box<dyn FnMut() -> BoxFuture<'a, Result<Value, NodeError>> + Send + 'a>;

/// Runs named steps at most once per execution.
///
/// Implementations must return the recorded result when a step name has
/// already completed for the current execution, retry retriable failures
/// with back-off, and give up immediately on non-retriable ones.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run `f` under `name`, or return the result recorded for `name`.
    async fn run_json(&self, name: &str, f: StepFn<'_>) -> Result<Value, NodeError>;

    /// Suspend the logical run for `duration`.
    async fn sleep(&self, name: &str, duration: Duration) -> Result<(), NodeError>;
}

impl<'s> dyn StepRunner + 's {
    /// Typed wrapper over [`StepRunner::run_json`].
    pub async fn run<T, F, Fut>(&self, name: &str, mut f: F) -> Result<T, NodeError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, NodeError>> + Send,
    {
        let body: StepFn<'_> = Box::new(move || {
            let attempt = f();
            async move {
                let output = attempt.await?;
                serde_json::to_value(output).map_err(NodeError::unexpected)
            }
            .boxed()
        });

        let value = self.run_json(name, body).await?;
        serde_json::from_value(value).map_err(|e| {
            NodeError::unexpected(format!("step '{name}' recorded an incompatible result: {e}"))
        })
    }
}
