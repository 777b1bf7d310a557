use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type MessageId = Uuid;

/// Identifies one delivery attempt of a locked message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(pub Uuid);

impl LockToken {
    pub fn new() -> Self {
        LockToken(Uuid::new_v4())
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receipt returned once the broker has accepted a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub message_id: MessageId,
    pub sequence_number: u64,
}

/// A message as stored by the broker. The body is opaque.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueMessage {
    pub id: MessageId,
    pub sequence_number: u64,
    pub enqueued_at_ms: u64,
    pub delivery_count: u32,
    pub body: Bytes,
}

impl QueueMessage {
    pub fn new(sequence_number: u64, enqueued_at_ms: u64, body: Bytes) -> Self {
        QueueMessage {
            id: Uuid::new_v4(),
            sequence_number,
            enqueued_at_ms,
            delivery_count: 0,
            body,
        }
    }
}

/// A message handed to a receiver under a lock.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedMessage {
    pub message: QueueMessage,
    pub lock_token: LockToken,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub active: usize,
    pub locked: usize,
    pub dead_lettered: usize,
}
