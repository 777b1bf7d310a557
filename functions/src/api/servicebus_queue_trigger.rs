use crate::errors::FunctionError;
use crate::handler::QueueFunction;
use async_trait::async_trait;
use queue::QueueMessage;
use std::time::Duration;

pub const NAME: &str = "servicebus_queue_trigger";

/// Consumer: logs the message body, then simulates work for `processing_delay`.
pub struct ServiceBusQueueTrigger {
    processing_delay: Duration,
}

impl ServiceBusQueueTrigger {
    pub fn new(processing_delay: Duration) -> Self {
        Self { processing_delay }
    }
}

#[async_trait]
impl QueueFunction for ServiceBusQueueTrigger {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn invoke(&self, message: &QueueMessage) -> Result<(), FunctionError> {
        let body = std::str::from_utf8(&message.body).map_err(|e| {
            FunctionError::ConsumerFault(format!("message body is not UTF-8: {e}"))
        })?;

        tracing::info!(
            message_id = %message.id,
            delivery_count = message.delivery_count,
            "ServiceBus queue trigger processed message: {body}"
        );

        tokio::time::sleep(self.processing_delay).await;

        tracing::info!(message_id = %message.id, "Finished processing message after delay.");
        Ok(())
    }
}
