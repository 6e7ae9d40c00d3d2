use crate::domain::error::DomainError;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Broker-assigned identifier of a published message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A "new file" announcement as delivered to a subscriber. The payload is the
/// UTF-8 file name, which is also the object key.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub id: MessageId,
    pub data: Vec<u8>,
    pub publish_time: DateTime<Utc>,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_attempt: u32,
}

impl NotificationMessage {
    pub fn new(id: MessageId, data: Vec<u8>) -> Self {
        Self { id, data, publish_time: Utc::now(), delivery_attempt: 0 }
    }

    /// Decode the payload into the announced file name.
    pub fn file_name(&self) -> Result<&str, DomainError> {
        std::str::from_utf8(&self.data).map_err(|source| DomainError::InvalidPayload {
            message_id: self.id.to_string(),
            source,
        })
    }
}

/// Outcome a handler reports back to the broker for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Ack,
    Nack,
}

impl<T, E> From<&Result<T, E>> for AckDecision {
    fn from(res: &Result<T, E>) -> Self {
        match res {
            Ok(_) => AckDecision::Ack,
            Err(_) => AckDecision::Nack,
        }
    }
}
