//! Operations: the pluggable asynchronous step the dispatcher runs per item.
//!
//! The dispatcher only knows the [`Operation`] signature. An operation must
//! not block the async runtime: blocking work belongs in a child process
//! (see [`CommandOperation`]) or `tokio::task::spawn_blocking`. Any timeout
//! is the operation's own business; the dispatcher never cancels one.

pub mod command;

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::model::post::PostTask;
use crate::model::{Outcome, WorkItem};

pub use command::CommandOperation;

/// One remote action, executed once per attempt of a work item.
#[async_trait]
pub trait Operation: Send + Sync {
    type Payload: Send + Sync;
    type Output: Send;

    /// Execute one attempt. All failures come back as `Err(Failure)`.
    async fn execute(&self, item: &WorkItem<Self::Payload>) -> Outcome<Self::Output>;
}

/// Adapter turning an async closure into an [`Operation`].
pub struct FnOperation<P, T, F> {
    f: F,
    _marker: PhantomData<fn(P) -> T>,
}

/// Wrap `f` as an operation. The returned future must not borrow the item.
pub fn from_fn<P, T, F, Fut>(f: F) -> FnOperation<P, T, F>
where
    F: Fn(&WorkItem<P>) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    FnOperation {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<P, T, F, Fut> Operation for FnOperation<P, T, F>
where
    P: Send + Sync,
    T: Send,
    F: Fn(&WorkItem<P>) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome<T>> + Send,
{
    type Payload = P;
    type Output = T;

    async fn execute(&self, item: &WorkItem<P>) -> Outcome<T> {
        (self.f)(item).await
    }
}

/// Succeeds immediately without touching the network.
#[derive(Debug, Clone, Default)]
pub struct DryRunOperation;

#[async_trait]
impl Operation for DryRunOperation {
    type Payload = PostTask;
    type Output = String;

    async fn execute(&self, item: &WorkItem<PostTask>) -> Outcome<String> {
        Ok(format!("dry-run:{}", item.payload.target()))
    }
}

/// The posting operations selectable from configuration.
#[derive(Debug, Clone)]
pub enum PostOperation {
    Command(CommandOperation),
    DryRun(DryRunOperation),
}

#[async_trait]
impl Operation for PostOperation {
    type Payload = PostTask;
    type Output = String;

    async fn execute(&self, item: &WorkItem<PostTask>) -> Outcome<String> {
        match self {
            PostOperation::Command(op) => op.execute(item).await,
            PostOperation::DryRun(op) => op.execute(item).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Failure;

    #[tokio::test]
    async fn closures_become_operations() {
        let op = from_fn(|item: &WorkItem<u32>| {
            let value = item.payload;
            async move {
                if value % 2 == 0 {
                    Ok(value * 10)
                } else {
                    Err(Failure::new("odd", format!("{value} is odd")))
                }
            }
        });

        assert_eq!(op.execute(&WorkItem::new(0, 4)).await, Ok(40));
        let err = op.execute(&WorkItem::new(1, 3)).await.unwrap_err();
        assert_eq!(err.kind, "odd");
    }
}
