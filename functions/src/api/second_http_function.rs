use crate::errors::FunctionError;
use crate::handler::{HttpFunction, HttpRequest};
use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use queue::QueueSender;
use std::sync::Arc;

pub const NAME: &str = "second_http_function";
pub const ROUTE: &str = "second_http_function";

pub const QUEUE_MESSAGE: &str =
    "Message from second HTTP function to trigger ServiceBus queue processing";

const RESPONSE_TEXT: &str = "This is the second function responding.";

/// Relay: puts one fixed message on the queue per invocation.
pub struct SecondHttpFunction {
    sender: Arc<dyn QueueSender>,
}

impl SecondHttpFunction {
    pub fn new(sender: Arc<dyn QueueSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl HttpFunction for SecondHttpFunction {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn invoke(&self, _request: HttpRequest) -> Result<Response<Bytes>, FunctionError> {
        tracing::info!("HTTP trigger function (second) processed a request.");

        let ack = self
            .sender
            .send(Bytes::from_static(QUEUE_MESSAGE.as_bytes()))
            .await
            .map_err(FunctionError::EnqueueFailed)?;

        tracing::info!(
            message_id = %ack.message_id,
            sequence_number = ack.sequence_number,
            "Sent message to ServiceBus queue: {QUEUE_MESSAGE}"
        );

        Response::builder()
            .status(StatusCode::OK)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )
            .body(Bytes::from_static(RESPONSE_TEXT.as_bytes()))
            .map_err(|e| FunctionError::InternalError(format!("Failed to build response: {e}")))
    }
}
