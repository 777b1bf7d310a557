use crate::api::WireMessage;
use crate::broker::Broker;
use crate::config::MAX_RECEIVE_WAIT_SECS;
use crate::connection::Connection;
use crate::errors::QueueError;
use crate::types::{Ack, LockToken, QueueMessage, ReceivedMessage};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

// Slack on top of a long-poll wait before the HTTP request itself times out.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Capability to place one opaque payload on a queue.
#[async_trait]
pub trait QueueSender: Send + Sync {
    async fn send(&self, payload: Bytes) -> Result<Ack, QueueError>;
}

/// Capability to receive and settle messages of a queue.
///
/// Every received message must be settled with `complete` (ack) or
/// `abandon` (nack). An unsettled message is redelivered once its lock expires.
#[async_trait]
pub trait QueueReceiver: Send + Sync {
    fn queue_name(&self) -> &str;

    async fn receive(&self, wait: Duration) -> Result<Option<ReceivedMessage>, QueueError>;

    async fn complete(&self, lock_token: LockToken) -> Result<(), QueueError>;

    async fn abandon(&self, lock_token: LockToken) -> Result<(), QueueError>;
}

/// A queue client bound to one queue, working against either the in-process
/// broker or a remote broker over HTTP.
#[derive(Clone)]
pub struct QueueClient {
    queue_name: String,
    inner: QueueClientInner,
}

#[derive(Clone)]
enum QueueClientInner {
    InProcess(Arc<Broker>),
    Url(HttpClient),
}

impl QueueClient {
    /// `in_process` backs the client when the connection is `inprocess`.
    pub fn new(connection: &Connection, queue_name: &str, in_process: &Arc<Broker>) -> Self {
        let inner = match connection {
            Connection::InProcess => QueueClientInner::InProcess(in_process.clone()),
            Connection::Url(url) => QueueClientInner::Url(HttpClient::new(url.clone())),
        };
        QueueClient {
            queue_name: queue_name.to_string(),
            inner,
        }
    }

    pub fn in_process(broker: Arc<Broker>, queue_name: &str) -> Self {
        QueueClient {
            queue_name: queue_name.to_string(),
            inner: QueueClientInner::InProcess(broker),
        }
    }

    pub fn url(url: Url, queue_name: &str) -> Self {
        QueueClient {
            queue_name: queue_name.to_string(),
            inner: QueueClientInner::Url(HttpClient::new(url)),
        }
    }

    pub async fn dead_letters(&self) -> Result<Vec<QueueMessage>, QueueError> {
        match &self.inner {
            QueueClientInner::InProcess(broker) => broker.dead_letters(&self.queue_name),
            QueueClientInner::Url(client) => client.dead_letters(&self.queue_name).await,
        }
    }
}

#[async_trait]
impl QueueSender for QueueClient {
    async fn send(&self, payload: Bytes) -> Result<Ack, QueueError> {
        match &self.inner {
            QueueClientInner::InProcess(broker) => broker.send(&self.queue_name, payload),
            QueueClientInner::Url(client) => client.send(&self.queue_name, payload).await,
        }
    }
}

#[async_trait]
impl QueueReceiver for QueueClient {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn receive(&self, wait: Duration) -> Result<Option<ReceivedMessage>, QueueError> {
        match &self.inner {
            QueueClientInner::InProcess(broker) => broker.receive(&self.queue_name, wait).await,
            QueueClientInner::Url(client) => client.receive(&self.queue_name, wait).await,
        }
    }

    async fn complete(&self, lock_token: LockToken) -> Result<(), QueueError> {
        match &self.inner {
            QueueClientInner::InProcess(broker) => broker.complete(&self.queue_name, lock_token),
            QueueClientInner::Url(client) => {
                client.settle(&self.queue_name, lock_token, "complete").await
            }
        }
    }

    async fn abandon(&self, lock_token: LockToken) -> Result<(), QueueError> {
        match &self.inner {
            QueueClientInner::InProcess(broker) => broker.abandon(&self.queue_name, lock_token),
            QueueClientInner::Url(client) => {
                client.settle(&self.queue_name, lock_token, "abandon").await
            }
        }
    }
}

#[derive(Clone)]
struct HttpClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpClient {
    fn new(base_url: Url) -> Self {
        HttpClient {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, QueueError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| QueueError::InvalidConnection("endpoint cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, queue: &str, payload: Bytes) -> Result<Ack, QueueError> {
        let url = self.endpoint(&["queues", queue, "messages"])?;
        let response = self.client.post(url).body(payload).send().await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(response.json::<Ack>().await?),
            status => Err(QueueError::UnexpectedStatus(status)),
        }
    }

    async fn receive(
        &self,
        queue: &str,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let url = self.endpoint(&["queues", queue, "messages", "receive"])?;
        let wait = wait.min(Duration::from_secs(MAX_RECEIVE_WAIT_SECS));
        let response = self
            .client
            .post(url)
            .query(&[("wait_secs", wait.as_secs())])
            .timeout(wait + REQUEST_TIMEOUT_SLACK)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::OK => {
                let wire = response.json::<WireMessage>().await?;
                Ok(Some(wire.into_received()?))
            }
            status => Err(QueueError::UnexpectedStatus(status)),
        }
    }

    async fn settle(
        &self,
        queue: &str,
        lock_token: LockToken,
        action: &str,
    ) -> Result<(), QueueError> {
        let token = lock_token.to_string();
        let url = self.endpoint(&["queues", queue, "locks", &token, action])?;
        let response = self.client.post(url).send().await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            StatusCode::GONE => Err(QueueError::LockLost(lock_token)),
            status => Err(QueueError::UnexpectedStatus(status)),
        }
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<QueueMessage>, QueueError> {
        let url = self.endpoint(&["queues", queue, "deadletter"])?;
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::OK => response
                .json::<Vec<WireMessage>>()
                .await?
                .into_iter()
                .map(WireMessage::into_message)
                .collect(),
            status => Err(QueueError::UnexpectedStatus(status)),
        }
    }
}
