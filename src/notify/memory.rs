use crate::domain::message::{AckDecision, MessageId, NotificationMessage};
use crate::domain::resource::{SubscriptionPath, TopicPath};
use crate::notify::{MessageHandler, Notifier, NotifyError, PullSession};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// How often a session looks for leases whose ack deadline passed.
const LEASE_SCAN_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct SubscriptionSettings {
    /// Time a delivered message may stay unsettled before it is redelivered.
    pub ack_deadline: Duration,
    /// Maximum number of handlers running at once within one session.
    pub max_outstanding: usize,
    /// Delay before a nacked message becomes deliverable again. Redelivery
    /// goes through the lease scan, so it is never faster than one scan
    /// interval.
    pub retry_delay: Duration,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self { ack_deadline: Duration::from_secs(10), max_outstanding: 64, retry_delay: Duration::from_secs(1) }
    }
}

struct Lease {
    message: NotificationMessage,
    expires_at: Instant,
    nacked: bool,
}

struct SubscriptionState {
    topic: TopicPath,
    settings: SubscriptionSettings,
    ready: VecDeque<NotificationMessage>,
    leased: HashMap<MessageId, Lease>,
    wake: Arc<Notify>,
}

impl SubscriptionState {
    fn backlog(&self) -> usize {
        self.ready.len() + self.leased.len()
    }
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<TopicPath, Vec<SubscriptionPath>>,
    subscriptions: HashMap<SubscriptionPath, SubscriptionState>,
}

/// In-process broker with topic fan-out, ack leases and redelivery of
/// nacked or expired messages.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<BrokerState>>,
    // signalled on every publish or settle, for backlog waiters
    changed: Arc<Notify>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_topic(&self, topic: &TopicPath) -> Result<(), NotifyError> {
        let mut state = self.inner.lock().await;
        if state.topics.contains_key(topic) {
            return Err(NotifyError::AlreadyExists { name: topic.to_string() });
        }
        state.topics.insert(topic.clone(), Vec::new());
        Ok(())
    }

    /// Attach a new subscription to an existing topic. Only messages
    /// published after this call are delivered to it.
    pub async fn create_subscription(
        &self,
        subscription: &SubscriptionPath,
        topic: &TopicPath,
        settings: SubscriptionSettings,
    ) -> Result<(), NotifyError> {
        let mut state = self.inner.lock().await;
        if state.subscriptions.contains_key(subscription) {
            return Err(NotifyError::AlreadyExists { name: subscription.to_string() });
        }
        let subs = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| NotifyError::TopicNotFound { topic: topic.to_string() })?;
        subs.push(subscription.clone());
        state.subscriptions.insert(
            subscription.clone(),
            SubscriptionState {
                topic: topic.clone(),
                settings: SubscriptionSettings { max_outstanding: settings.max_outstanding.max(1), ..settings },
                ready: VecDeque::new(),
                leased: HashMap::new(),
                wake: Arc::new(Notify::new()),
            },
        );
        Ok(())
    }

    /// Remove a subscription and its backlog. Running sessions on it fail.
    pub async fn delete_subscription(&self, subscription: &SubscriptionPath) -> Result<(), NotifyError> {
        let mut state = self.inner.lock().await;
        let removed = state
            .subscriptions
            .remove(subscription)
            .ok_or_else(|| NotifyError::SubscriptionNotFound { subscription: subscription.to_string() })?;
        if let Some(subs) = state.topics.get_mut(&removed.topic) {
            subs.retain(|s| s != subscription);
        }
        removed.wake.notify_waiters();
        Ok(())
    }

    /// Messages not yet acknowledged: queued plus currently leased.
    pub async fn backlog(&self, subscription: &SubscriptionPath) -> Result<usize, NotifyError> {
        let state = self.inner.lock().await;
        state
            .subscriptions
            .get(subscription)
            .map(SubscriptionState::backlog)
            .ok_or_else(|| NotifyError::SubscriptionNotFound { subscription: subscription.to_string() })
    }

    /// Wait until the backlog of `subscription` equals `expected` or the
    /// timeout elapses.
    pub async fn wait_for_backlog(&self, subscription: &SubscriptionPath, expected: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Ok(n) = self.backlog(subscription).await {
                if n == expected {
                    return true;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let _ = tokio::time::timeout(deadline - now, notified).await;
        }
    }

    async fn lease_next(&self, subscription: &SubscriptionPath) -> Result<Option<NotificationMessage>, NotifyError> {
        let mut state = self.inner.lock().await;
        let sub = state
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| NotifyError::SubscriptionNotFound { subscription: subscription.to_string() })?;
        let Some(mut message) = sub.ready.pop_front() else {
            return Ok(None);
        };
        message.delivery_attempt = message.delivery_attempt.saturating_add(1);
        let expires_at = Instant::now() + sub.settings.ack_deadline;
        sub.leased.insert(message.id.clone(), Lease { message: message.clone(), expires_at, nacked: false });
        Ok(Some(message))
    }

    async fn settle(&self, subscription: &SubscriptionPath, id: MessageId, decision: AckDecision) {
        {
            let mut state = self.inner.lock().await;
            // subscription may have been deleted while the handler ran
            let Some(sub) = state.subscriptions.get_mut(subscription) else {
                return;
            };
            match decision {
                AckDecision::Ack => {
                    if sub.leased.remove(&id).is_none() {
                        // lease expired and the message was queued again
                        sub.ready.retain(|m| m.id != id);
                    }
                }
                AckDecision::Nack => {
                    // the lease scan requeues it once the delay is over
                    if let Some(lease) = sub.leased.get_mut(&id) {
                        lease.expires_at = Instant::now() + sub.settings.retry_delay;
                        lease.nacked = true;
                    }
                }
            }
        }
        self.changed.notify_waiters();
    }

    async fn expire_leases(&self, subscription: &SubscriptionPath) {
        let mut state = self.inner.lock().await;
        let Some(sub) = state.subscriptions.get_mut(subscription) else {
            return;
        };
        let now = Instant::now();
        let expired: Vec<MessageId> =
            sub.leased.iter().filter(|(_, l)| l.expires_at <= now).map(|(id, _)| id.clone()).collect();
        for id in expired {
            if let Some(lease) = sub.leased.remove(&id) {
                if lease.nacked {
                    debug!(subscription = %subscription, message_id = %id, "retry delay over, redelivering");
                } else {
                    warn!(subscription = %subscription, message_id = %id, "ack deadline expired, redelivering");
                }
                sub.ready.push_back(lease.message);
                sub.wake.notify_one();
            }
        }
    }

    async fn run_session(
        self,
        subscription: SubscriptionPath,
        handler: Arc<dyn MessageHandler>,
        wake: Arc<Notify>,
        max_outstanding: usize,
        cancel: CancellationToken,
    ) -> Result<(), NotifyError> {
        let mut in_flight: JoinSet<(MessageId, AckDecision)> = JoinSet::new();
        let mut lease_scan = tokio::time::interval(LEASE_SCAN_INTERVAL);
        lease_scan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let outcome = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }
            if let Err(e) = self.fill(&subscription, &handler, &mut in_flight, max_outstanding).await {
                break Err(e);
            }

            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = wake.notified() => {}
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    self.apply(&subscription, joined).await;
                }
                _ = lease_scan.tick() => {
                    self.expire_leases(&subscription).await;
                }
            }
        };

        // drain: stop pulling, let every in-flight handler finish
        while let Some(joined) = in_flight.join_next().await {
            self.apply(&subscription, joined).await;
        }
        debug!(subscription = %subscription, "pull session drained");
        outcome
    }

    /// Lease and dispatch ready messages until the flow-control cap is hit or
    /// the queue is empty.
    async fn fill(
        &self,
        subscription: &SubscriptionPath,
        handler: &Arc<dyn MessageHandler>,
        in_flight: &mut JoinSet<(MessageId, AckDecision)>,
        max_outstanding: usize,
    ) -> Result<(), NotifyError> {
        while in_flight.len() < max_outstanding {
            let Some(message) = self.lease_next(subscription).await? else {
                break;
            };
            debug!(subscription = %subscription, message_id = %message.id, attempt = message.delivery_attempt, "delivering message");
            let handler = handler.clone();
            in_flight.spawn(async move {
                let id = message.id.clone();
                let decision = handler.handle(message).await;
                (id, decision)
            });
        }
        Ok(())
    }

    async fn apply(&self, subscription: &SubscriptionPath, joined: Result<(MessageId, AckDecision), tokio::task::JoinError>) {
        match joined {
            Ok((id, decision)) => self.settle(subscription, id, decision).await,
            // the lease stays in place and expires into a redelivery
            Err(e) => error!(subscription = %subscription, error = %e, "message handler panicked"),
        }
    }
}

#[async_trait]
impl Notifier for MemoryBroker {
    async fn publish(&self, topic: &TopicPath, payload: Vec<u8>) -> Result<MessageId, NotifyError> {
        let id = MessageId::generate();
        {
            let mut state = self.inner.lock().await;
            let subs = state
                .topics
                .get(topic)
                .cloned()
                .ok_or_else(|| NotifyError::TopicNotFound { topic: topic.to_string() })?;
            if subs.is_empty() {
                debug!(topic = %topic, message_id = %id, "topic has no subscriptions, message dropped");
            }
            for sub_path in subs {
                if let Some(sub) = state.subscriptions.get_mut(&sub_path) {
                    sub.ready.push_back(NotificationMessage::new(id.clone(), payload.clone()));
                    sub.wake.notify_one();
                }
            }
        }
        self.changed.notify_waiters();
        Ok(id)
    }

    async fn subscribe(
        &self,
        subscription: &SubscriptionPath,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<PullSession, NotifyError> {
        let (wake, max_outstanding) = {
            let state = self.inner.lock().await;
            let sub = state
                .subscriptions
                .get(subscription)
                .ok_or_else(|| NotifyError::SubscriptionNotFound { subscription: subscription.to_string() })?;
            (sub.wake.clone(), sub.settings.max_outstanding)
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.clone().run_session(
            subscription.clone(),
            handler,
            wake,
            max_outstanding,
            cancel.clone(),
        ));
        Ok(PullSession::new(subscription.clone(), cancel, task))
    }
}
