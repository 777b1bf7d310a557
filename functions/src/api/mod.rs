//! The functions of the chain: an HTTP entry point, an HTTP relay that
//! enqueues, and the queue consumer.

pub mod first_http_function;
pub mod second_http_function;
pub mod servicebus_queue_trigger;
