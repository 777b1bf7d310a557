//! In-memory peek-lock broker.
//!
//! Every queue keeps three sets of messages:
//! - available, ordered by sequence number
//! - locked, keyed by lock token, each with an expiry
//! - dead-lettered
//!
//! A received message is locked rather than removed. `complete` removes it,
//! `abandon` or lock expiry makes it available again until its delivery count
//! reaches `max_delivery_count`, after which it is dead-lettered.

use crate::config::{BrokerSettings, MAX_RECEIVE_WAIT_SECS};
use crate::errors::{QueueError, Result};
use crate::metrics_defs::{
    MESSAGES_ABANDONED, MESSAGES_COMPLETED, MESSAGES_DEAD_LETTERED, MESSAGES_SENT, QUEUE_DEPTH,
};
use crate::types::{Ack, LockToken, QueueMessage, QueueStats, ReceivedMessage};
use bytes::Bytes;
use parking_lot::Mutex;
use shared::{counter, gauge};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Dead letters kept per queue; the oldest are dropped beyond this.
pub const MAX_DEAD_LETTERS: usize = 1000;

pub struct Broker {
    settings: BrokerSettings,
    queues: Mutex<HashMap<String, Arc<Queue>>>,
}

impl Broker {
    pub fn new(settings: BrokerSettings) -> Self {
        Broker {
            settings,
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Returns the named queue if it exists.
    fn existing_queue(&self, name: &str) -> Result<Option<Arc<Queue>>> {
        if name.trim().is_empty() {
            return Err(QueueError::InvalidQueueName);
        }
        Ok(self.queues.lock().get(name).cloned())
    }

    /// Returns the named queue, creating it on first use.
    fn queue(&self, name: &str) -> Result<Arc<Queue>> {
        if name.trim().is_empty() {
            return Err(QueueError::InvalidQueueName);
        }

        let mut queues = self.queues.lock();
        let queue = queues
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(queue = name, "creating queue");
                Arc::new(Queue::new(name))
            })
            .clone();
        Ok(queue)
    }

    pub fn send(&self, queue_name: &str, body: Bytes) -> Result<Ack> {
        let queue = self.queue(queue_name)?;

        let ack = {
            let mut state = queue.state.lock();
            state.next_sequence += 1;
            let message = QueueMessage::new(state.next_sequence, now_ms(), body);
            let ack = Ack {
                message_id: message.id,
                sequence_number: message.sequence_number,
            };
            state.available.push_back(message);
            queue.report_depth(&state);
            ack
        };

        counter!(MESSAGES_SENT, "queue" => queue.name.clone()).increment(1);
        tracing::debug!(
            queue = queue_name,
            message_id = %ack.message_id,
            sequence_number = ack.sequence_number,
            "message enqueued"
        );

        queue.notify.notify_one();
        Ok(ack)
    }

    /// Locks the oldest available message, waiting up to `wait` for one to
    /// arrive. Returns `None` if nothing became available in time. `wait` is
    /// capped at `MAX_RECEIVE_WAIT_SECS`.
    pub async fn receive(&self, queue_name: &str, wait: Duration) -> Result<Option<ReceivedMessage>> {
        let queue = self.queue(queue_name)?;
        let deadline = Instant::now() + wait.min(Duration::from_secs(MAX_RECEIVE_WAIT_SECS));

        loop {
            let notified = queue.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_expiry = {
                let mut state = queue.state.lock();
                if let Some(received) = self.lock_next(&queue, &mut state) {
                    return Ok(Some(received));
                }
                state.next_lock_expiry()
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let wake_at = match next_expiry {
                Some(expiry) if expiry < deadline => expiry,
                _ => deadline,
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    /// Removes a locked message for good.
    pub fn complete(&self, queue_name: &str, lock_token: LockToken) -> Result<()> {
        let queue = self
            .existing_queue(queue_name)?
            .ok_or(QueueError::LockLost(lock_token))?;
        let mut state = queue.state.lock();
        self.release_expired(&queue, &mut state);

        let locked = state
            .locked
            .remove(&lock_token)
            .ok_or(QueueError::LockLost(lock_token))?;
        queue.report_depth(&state);
        drop(state);

        counter!(MESSAGES_COMPLETED, "queue" => queue.name.clone()).increment(1);
        tracing::debug!(
            queue = queue_name,
            message_id = %locked.message.id,
            "message completed"
        );
        Ok(())
    }

    /// Releases a locked message so it can be delivered again.
    pub fn abandon(&self, queue_name: &str, lock_token: LockToken) -> Result<()> {
        let queue = self
            .existing_queue(queue_name)?
            .ok_or(QueueError::LockLost(lock_token))?;
        {
            let mut state = queue.state.lock();
            self.release_expired(&queue, &mut state);

            let locked = state
                .locked
                .remove(&lock_token)
                .ok_or(QueueError::LockLost(lock_token))?;
            counter!(MESSAGES_ABANDONED, "queue" => queue.name.clone()).increment(1);
            self.requeue(&queue, &mut state, locked.message);
            queue.report_depth(&state);
        }

        queue.notify.notify_one();
        Ok(())
    }

    /// Oldest first, at most `MAX_DEAD_LETTERS`.
    pub fn dead_letters(&self, queue_name: &str) -> Result<Vec<QueueMessage>> {
        let Some(queue) = self.existing_queue(queue_name)? else {
            return Ok(Vec::new());
        };
        let state = queue.state.lock();
        Ok(state.dead_letters.iter().cloned().collect())
    }

    pub fn stats(&self, queue_name: &str) -> Result<QueueStats> {
        let Some(queue) = self.existing_queue(queue_name)? else {
            return Ok(QueueStats::default());
        };
        let mut state = queue.state.lock();
        self.release_expired(&queue, &mut state);
        Ok(state.stats())
    }

    fn lock_next(&self, queue: &Queue, state: &mut QueueState) -> Option<ReceivedMessage> {
        self.release_expired(queue, state);

        let mut message = state.available.pop_front()?;
        message.delivery_count += 1;

        let lock_token = LockToken::new();
        state.locked.insert(
            lock_token,
            LockedMessage {
                message: message.clone(),
                locked_until: Instant::now() + self.settings.lock_duration(),
            },
        );
        queue.report_depth(state);

        Some(ReceivedMessage {
            message,
            lock_token,
        })
    }

    fn release_expired(&self, queue: &Queue, state: &mut QueueState) {
        let now = Instant::now();
        let expired: Vec<LockToken> = state
            .locked
            .iter()
            .filter(|(_, locked)| locked.locked_until <= now)
            .map(|(token, _)| *token)
            .collect();

        for token in expired {
            if let Some(locked) = state.locked.remove(&token) {
                tracing::warn!(
                    queue = %queue.name,
                    message_id = %locked.message.id,
                    delivery_count = locked.message.delivery_count,
                    "message lock expired"
                );
                self.requeue(queue, state, locked.message);
            }
        }
    }

    fn requeue(&self, queue: &Queue, state: &mut QueueState, message: QueueMessage) {
        if message.delivery_count >= self.settings.max_delivery_count {
            tracing::warn!(
                queue = %queue.name,
                message_id = %message.id,
                delivery_count = message.delivery_count,
                "max delivery count reached, dead-lettering message"
            );
            counter!(MESSAGES_DEAD_LETTERED, "queue" => queue.name.clone()).increment(1);
            if state.dead_letters.len() >= MAX_DEAD_LETTERS {
                state.dead_letters.pop_front();
            }
            state.dead_letters.push_back(message);
            return;
        }

        let position = state
            .available
            .partition_point(|m| m.sequence_number < message.sequence_number);
        state.available.insert(position, message);
    }
}

struct Queue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Queue {
    fn new(name: &str) -> Self {
        Queue {
            name: name.to_string(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    fn report_depth(&self, state: &QueueState) {
        gauge!(QUEUE_DEPTH, "queue" => self.name.clone())
            .set((state.available.len() + state.locked.len()) as f64);
    }
}

#[derive(Default)]
struct QueueState {
    next_sequence: u64,
    available: VecDeque<QueueMessage>,
    locked: HashMap<LockToken, LockedMessage>,
    dead_letters: VecDeque<QueueMessage>,
}

impl QueueState {
    fn next_lock_expiry(&self) -> Option<Instant> {
        self.locked.values().map(|l| l.locked_until).min()
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            active: self.available.len(),
            locked: self.locked.len(),
            dead_lettered: self.dead_letters.len(),
        }
    }
}

struct LockedMessage {
    message: QueueMessage,
    locked_until: Instant,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(lock_duration_secs: u64, max_delivery_count: u32) -> Broker {
        Broker::new(BrokerSettings {
            lock_duration_secs,
            max_delivery_count,
        })
    }

    #[tokio::test]
    async fn test_send_receive_complete() {
        let broker = broker(30, 10);
        let ack = broker.send("orders", Bytes::from_static(b"hello")).unwrap();
        assert_eq!(ack.sequence_number, 1);

        let received = broker
            .receive("orders", Duration::ZERO)
            .await
            .unwrap()
            .expect("message available");
        assert_eq!(received.message.id, ack.message_id);
        assert_eq!(received.message.body, Bytes::from_static(b"hello"));
        assert_eq!(received.message.delivery_count, 1);

        // Locked messages are invisible to other receivers.
        assert!(broker.receive("orders", Duration::ZERO).await.unwrap().is_none());
        assert_eq!(broker.stats("orders").unwrap().locked, 1);

        broker.complete("orders", received.lock_token).unwrap();
        assert_eq!(broker.stats("orders").unwrap(), QueueStats::default());

        // A completed lock cannot be settled twice.
        assert!(matches!(
            broker.complete("orders", received.lock_token),
            Err(QueueError::LockLost(_))
        ));
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let broker = broker(30, 10);
        for body in ["a", "b", "c"] {
            broker.send("q", Bytes::from(body)).unwrap();
        }

        let mut bodies = Vec::new();
        while let Some(received) = broker.receive("q", Duration::ZERO).await.unwrap() {
            bodies.push(received.message.body.clone());
            broker.complete("q", received.lock_token).unwrap();
        }
        assert_eq!(
            bodies,
            vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]
        );
    }

    #[tokio::test]
    async fn test_abandon_redelivers_in_sequence_order() {
        let broker = broker(30, 10);
        broker.send("q", Bytes::from("first")).unwrap();
        broker.send("q", Bytes::from("second")).unwrap();

        let first = broker.receive("q", Duration::ZERO).await.unwrap().unwrap();
        broker.abandon("q", first.lock_token).unwrap();

        let again = broker.receive("q", Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(again.message.id, first.message.id);
        assert_eq!(again.message.delivery_count, 2);
        assert_ne!(again.lock_token, first.lock_token);
    }

    #[tokio::test]
    async fn test_dead_letter_after_max_deliveries() {
        let broker = broker(30, 2);
        let ack = broker.send("q", Bytes::from("poison")).unwrap();

        for _ in 0..2 {
            let received = broker.receive("q", Duration::ZERO).await.unwrap().unwrap();
            broker.abandon("q", received.lock_token).unwrap();
        }

        assert!(broker.receive("q", Duration::ZERO).await.unwrap().is_none());
        let dead = broker.dead_letters("q").unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, ack.message_id);
        assert_eq!(dead[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn test_expired_lock_is_redelivered() {
        let broker = broker(1, 10);
        broker.send("q", Bytes::from("slow")).unwrap();

        let first = broker.receive("q", Duration::ZERO).await.unwrap().unwrap();

        // The receiver wakes up when the lock expires rather than at its deadline.
        let started = std::time::Instant::now();
        let again = broker
            .receive("q", Duration::from_secs(5))
            .await
            .unwrap()
            .expect("redelivered after lock expiry");
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(again.message.id, first.message.id);
        assert_eq!(again.message.delivery_count, 2);

        assert!(matches!(
            broker.complete("q", first.lock_token),
            Err(QueueError::LockLost(_))
        ));
        broker.complete("q", again.lock_token).unwrap();
    }

    #[tokio::test]
    async fn test_receive_waits_for_send() {
        let broker = Arc::new(broker(30, 10));

        let receiver = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.receive("q", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        broker.send("q", Bytes::from("late")).unwrap();

        let received = receiver.await.unwrap().unwrap().expect("woken by send");
        assert_eq!(received.message.body, Bytes::from("late"));
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let broker = broker(30, 10);
        let received = broker
            .receive("q", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_oversized_wait_and_lock_do_not_overflow() {
        let broker = Arc::new(broker(u64::MAX, 10));

        let receiver = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.receive("q", Duration::from_secs(u64::MAX)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        broker.send("q", Bytes::from("m")).unwrap();

        let received = receiver.await.unwrap().unwrap().expect("woken by send");
        assert_eq!(broker.stats("q").unwrap().locked, 1);
        broker.complete("q", received.lock_token).unwrap();
    }

    #[tokio::test]
    async fn test_read_paths_do_not_create_queues() {
        let broker = broker(30, 10);

        assert!(broker.dead_letters("nope").unwrap().is_empty());
        assert_eq!(broker.stats("nope").unwrap(), QueueStats::default());
        assert!(matches!(
            broker.complete("nope", LockToken::new()),
            Err(QueueError::LockLost(_))
        ));
        assert!(matches!(
            broker.abandon("nope", LockToken::new()),
            Err(QueueError::LockLost(_))
        ));
        assert!(broker.queues.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dead_letters_are_capped() {
        let broker = broker(30, 1);
        for i in 0..MAX_DEAD_LETTERS + 5 {
            broker.send("q", Bytes::from(i.to_string())).unwrap();
            let received = broker.receive("q", Duration::ZERO).await.unwrap().unwrap();
            broker.abandon("q", received.lock_token).unwrap();
        }

        let dead = broker.dead_letters("q").unwrap();
        assert_eq!(dead.len(), MAX_DEAD_LETTERS);
        assert_eq!(dead[0].body, Bytes::from("5"));
        assert_eq!(
            dead[MAX_DEAD_LETTERS - 1].body,
            Bytes::from((MAX_DEAD_LETTERS + 4).to_string())
        );
    }

    #[test]
    fn test_empty_queue_name() {
        let broker = broker(30, 10);
        assert!(matches!(
            broker.send(" ", Bytes::new()),
            Err(QueueError::InvalidQueueName)
        ));
    }
}
