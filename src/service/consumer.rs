use crate::domain::resource::SubscriptionPath;
use crate::notify::{MessageHandler, Notifier, NotifyError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("cannot open pull session on {subscription}: {source}")]
    Setup {
        subscription: String,
        #[source]
        source: NotifyError,
    },

    #[error("pull session on {subscription} failed: {source}")]
    Session {
        subscription: String,
        #[source]
        source: NotifyError,
    },
}

/// How a pull session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The duration elapsed; the session was cancelled and drained.
    TimedOut,
    /// Shutdown was requested; the session was cancelled and drained.
    Shutdown,
    /// The backend ended the session on its own.
    Closed,
}

/// Runs bounded pull sessions against one subscription.
#[derive(Clone)]
pub struct Consumer {
    notifier: Arc<dyn Notifier>,
    subscription: SubscriptionPath,
    handler: Arc<dyn MessageHandler>,
}

impl Consumer {
    pub fn new(notifier: Arc<dyn Notifier>, subscription: SubscriptionPath, handler: Arc<dyn MessageHandler>) -> Self {
        Self { notifier, subscription, handler }
    }

    pub fn subscription(&self) -> &SubscriptionPath {
        &self.subscription
    }

    /// Pull for up to `max_duration`, then cancel and wait for in-flight
    /// handlers before returning.
    pub async fn consume(&self, max_duration: Duration) -> Result<SessionOutcome, ConsumeError> {
        self.consume_until(max_duration, &CancellationToken::new()).await
    }

    /// Like [`Consumer::consume`], but the wait also ends early when
    /// `shutdown` fires. Either way the session is drained before returning.
    pub async fn consume_until(
        &self,
        max_duration: Duration,
        shutdown: &CancellationToken,
    ) -> Result<SessionOutcome, ConsumeError> {
        let mut session = self.notifier.subscribe(&self.subscription, self.handler.clone()).await.map_err(|source| {
            ConsumeError::Setup { subscription: self.subscription.to_string(), source }
        })?;
        info!(subscription = %self.subscription, max_secs = max_duration.as_secs_f64(), "listening for messages");

        // 1. wait with a deadline
        let early = tokio::select! {
            res = tokio::time::timeout(max_duration, session.wait()) => match res {
                Ok(ended) => Some(ended),
                Err(_elapsed) => None,
            },
            _ = shutdown.cancelled() => None,
        };

        let outcome = match early {
            Some(Ok(())) => SessionOutcome::Closed,
            Some(Err(source)) => {
                error!(subscription = %self.subscription, error = %source, "pull session failed");
                return Err(ConsumeError::Session { subscription: self.subscription.to_string(), source });
            }
            None => {
                // 2. request cancel, 3. wait for the drain
                session.cancel();
                session.wait().await.map_err(|source| ConsumeError::Session {
                    subscription: self.subscription.to_string(),
                    source,
                })?;
                if shutdown.is_cancelled() {
                    SessionOutcome::Shutdown
                } else {
                    SessionOutcome::TimedOut
                }
            }
        };
        info!(subscription = %self.subscription, outcome = ?outcome, "pull session finished");
        Ok(outcome)
    }

    /// Back-to-back sessions of `session_duration` until `shutdown` fires.
    /// A session error ends the loop and is returned.
    pub async fn run(&self, session_duration: Duration, shutdown: CancellationToken) -> Result<(), ConsumeError> {
        while !shutdown.is_cancelled() {
            self.consume_until(session_duration, &shutdown).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{AckDecision, NotificationMessage};
    use crate::domain::resource::TopicPath;
    use crate::notify::{handler_fn, MemoryBroker, SubscriptionSettings};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    async fn broker() -> (MemoryBroker, TopicPath, SubscriptionPath) {
        let broker = MemoryBroker::new();
        let topic = TopicPath::new("p", "files");
        let sub = SubscriptionPath::new("p", "files-sub");
        broker.create_topic(&topic).await.unwrap();
        broker.create_subscription(&sub, &topic, SubscriptionSettings::default()).await.unwrap();
        (broker, topic, sub)
    }

    #[tokio::test]
    async fn idle_session_times_out_without_error() {
        let (broker, _topic, sub) = broker().await;
        let consumer = Consumer::new(Arc::new(broker), sub, handler_fn(|_m| async { AckDecision::Ack }));

        let started = Instant::now();
        let outcome = consumer.consume(Duration::from_millis(100)).await.unwrap();
        assert_eq!(outcome, SessionOutcome::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(1_000), "drain took {elapsed:?}");
    }

    #[tokio::test]
    async fn unknown_subscription_is_a_setup_error() {
        let broker = MemoryBroker::new();
        let consumer = Consumer::new(
            Arc::new(broker),
            SubscriptionPath::new("p", "missing"),
            handler_fn(|_m| async { AckDecision::Ack }),
        );
        let err = consumer.consume(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ConsumeError::Setup { .. }));
    }

    #[tokio::test]
    async fn timeout_waits_for_in_flight_handler() {
        let (broker, topic, sub) = broker().await;
        broker.publish(&topic, b"a.txt".to_vec()).await.unwrap();

        let finished = Arc::new(AtomicUsize::new(0));
        let done = finished.clone();
        let handler = handler_fn(move |_m: NotificationMessage| {
            let done = done.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                done.fetch_add(1, Ordering::SeqCst);
                AckDecision::Ack
            }
        });
        let consumer = Consumer::new(Arc::new(broker.clone()), sub.clone(), handler);

        let outcome = consumer.consume(Duration::from_millis(50)).await.unwrap();
        assert_eq!(outcome, SessionOutcome::TimedOut);
        // returned only after the handler finished and its ack was applied
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(broker.backlog(&sub).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn shutdown_ends_session_early() {
        let (broker, _topic, sub) = broker().await;
        let consumer = Consumer::new(Arc::new(broker), sub, handler_fn(|_m| async { AckDecision::Ack }));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let started = Instant::now();
        let outcome = consumer.consume_until(Duration::from_secs(30), &shutdown).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Shutdown);
        assert!(started.elapsed() < Duration::from_secs(5));
        consumer.run(Duration::from_secs(30), shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn failing_session_propagates() {
        let (broker, _topic, sub) = broker().await;
        let consumer = Consumer::new(Arc::new(broker.clone()), sub.clone(), handler_fn(|_m| async { AckDecision::Ack }));
        let deleter = broker.clone();
        let target = sub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            deleter.delete_subscription(&target).await.unwrap();
        });
        let err = consumer.consume(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ConsumeError::Session { .. }));
    }
}
