//! Message notification seam: publish to a topic, pull from a subscription
//! with explicit per-message acknowledgement.

pub mod memory;

pub use memory::{MemoryBroker, SubscriptionSettings};

use crate::domain::message::{AckDecision, MessageId, NotificationMessage};
use crate::domain::resource::{SubscriptionPath, TopicPath};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("topic {topic} not found")]
    TopicNotFound { topic: String },

    #[error("subscription {subscription} not found")]
    SubscriptionNotFound { subscription: String },

    #[error("{name} already exists")]
    AlreadyExists { name: String },

    #[error("pull session on {subscription} aborted: {reason}")]
    SessionAborted { subscription: String, reason: String },
}

/// Invoked once per delivered message. The returned decision is applied by
/// the broker: `Ack` removes the message, `Nack` makes it deliverable again.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: NotificationMessage) -> AckDecision;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(NotificationMessage) -> Fut + Send + Sync,
    Fut: Future<Output = AckDecision> + Send,
{
    async fn handle(&self, message: NotificationMessage) -> AckDecision {
        (self.0)(message).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(NotificationMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckDecision> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Durable publish/subscribe broker.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish `payload` on `topic`, returning the broker-assigned id once the
    /// broker has accepted the message.
    async fn publish(&self, topic: &TopicPath, payload: Vec<u8>) -> Result<MessageId, NotifyError>;

    /// Open a streaming pull session. Messages are pushed into `handler`
    /// concurrently until the session is cancelled. Setup failures are
    /// returned here; failures while the session runs surface from
    /// [`PullSession::wait`].
    async fn subscribe(
        &self,
        subscription: &SubscriptionPath,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<PullSession, NotifyError>;
}

/// A running pull session.
///
/// `cancel` asks the delivery task to stop pulling; `wait` resolves once the
/// task has finished, which after a cancel means every in-flight handler
/// returned and its decision was applied. Dropping the session cancels it
/// without waiting.
pub struct PullSession {
    subscription: SubscriptionPath,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), NotifyError>>>,
}

impl PullSession {
    pub fn new(
        subscription: SubscriptionPath,
        cancel: CancellationToken,
        task: JoinHandle<Result<(), NotifyError>>,
    ) -> Self {
        Self { subscription, cancel, task: Some(task) }
    }

    pub fn subscription(&self) -> &SubscriptionPath {
        &self.subscription
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the delivery task to finish. Cancel-safe: if the returned
    /// future is dropped before completion the session keeps running and
    /// `wait` can be called again.
    pub async fn wait(&mut self) -> Result<(), NotifyError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let joined = task.await;
        self.task = None;
        match joined {
            Ok(res) => res,
            Err(e) => Err(NotifyError::SessionAborted {
                subscription: self.subscription.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Drop for PullSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
