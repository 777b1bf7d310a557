use crate::broker::Broker;
use crate::config::MAX_RECEIVE_WAIT_SECS;
use crate::errors::QueueError;
use crate::types::{Ack, LockToken, MessageId, QueueMessage, ReceivedMessage};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub fn router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/queues/{queue}/messages", post(send_message))
        .route("/queues/{queue}/messages/receive", post(receive_message))
        .route(
            "/queues/{queue}/locks/{lock_token}/complete",
            post(complete_message),
        )
        .route(
            "/queues/{queue}/locks/{lock_token}/abandon",
            post(abandon_message),
        )
        .route("/queues/{queue}/deadletter", get(dead_letters))
        .with_state(broker)
}

pub async fn serve(listener: TcpListener, broker: Arc<Broker>) -> Result<(), QueueError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "queue broker listening");
    }
    axum::serve(listener, router(broker)).await?;
    Ok(())
}

/// JSON form of a message. The body travels base64 encoded so arbitrary
/// payloads survive the round trip.
#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct WireMessage {
    pub message_id: MessageId,
    pub sequence_number: u64,
    pub enqueued_at_ms: u64,
    pub delivery_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_token: Option<LockToken>,
    pub body: String,
}

impl WireMessage {
    fn new(message: &QueueMessage, lock_token: Option<LockToken>) -> Self {
        WireMessage {
            message_id: message.id,
            sequence_number: message.sequence_number,
            enqueued_at_ms: message.enqueued_at_ms,
            delivery_count: message.delivery_count,
            lock_token,
            body: STANDARD.encode(&message.body),
        }
    }

    pub fn into_message(self) -> Result<QueueMessage, QueueError> {
        let body = STANDARD
            .decode(self.body.as_bytes())
            .map_err(|e| QueueError::Decode(e.to_string()))?;
        Ok(QueueMessage {
            id: self.message_id,
            sequence_number: self.sequence_number,
            enqueued_at_ms: self.enqueued_at_ms,
            delivery_count: self.delivery_count,
            body: body.into(),
        })
    }

    pub fn into_received(self) -> Result<ReceivedMessage, QueueError> {
        let lock_token = self
            .lock_token
            .ok_or_else(|| QueueError::Decode("missing lock_token".into()))?;
        Ok(ReceivedMessage {
            message: self.into_message()?,
            lock_token,
        })
    }
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

#[derive(Deserialize, Debug)]
struct ReceiveParams {
    wait_secs: Option<u64>,
}

async fn health() -> &'static str {
    "ok\n"
}

async fn send_message(
    State(broker): State<Arc<Broker>>,
    Path(queue): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Ack>), QueueError> {
    let ack = broker.send(&queue, body)?;
    Ok((StatusCode::CREATED, Json(ack)))
}

async fn receive_message(
    State(broker): State<Arc<Broker>>,
    Path(queue): Path<String>,
    Query(params): Query<ReceiveParams>,
) -> Result<Response, QueueError> {
    let wait_secs = params.wait_secs.unwrap_or(0).min(MAX_RECEIVE_WAIT_SECS);
    let received = broker
        .receive(&queue, Duration::from_secs(wait_secs))
        .await?;

    Ok(match received {
        Some(received) => Json(WireMessage::new(
            &received.message,
            Some(received.lock_token),
        ))
        .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn complete_message(
    State(broker): State<Arc<Broker>>,
    Path((queue, lock_token)): Path<(String, LockToken)>,
) -> Result<StatusCode, QueueError> {
    broker.complete(&queue, lock_token)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn abandon_message(
    State(broker): State<Arc<Broker>>,
    Path((queue, lock_token)): Path<(String, LockToken)>,
) -> Result<StatusCode, QueueError> {
    broker.abandon(&queue, lock_token)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn dead_letters(
    State(broker): State<Arc<Broker>>,
    Path(queue): Path<String>,
) -> Result<Json<Vec<WireMessage>>, QueueError> {
    let messages = broker.dead_letters(&queue)?;
    Ok(Json(
        messages.iter().map(|m| WireMessage::new(m, None)).collect(),
    ))
}

impl IntoResponse for QueueError {
    fn into_response(self) -> Response {
        let status = match self {
            QueueError::InvalidQueueName => StatusCode::BAD_REQUEST,
            QueueError::LockLost(_) => StatusCode::GONE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ApiErrorResponse {
            error_message: self.to_string(),
        });

        (status, body).into_response()
    }
}
