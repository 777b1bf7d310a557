//! At-least-once message queue with peek-lock delivery.
//!
//! The [`broker::Broker`] holds the messages; [`client::QueueClient`] exposes it
//! to senders and receivers either in process or through the HTTP API in
//! [`api`], which is what `run` serves for a standalone broker.

pub mod api;
pub mod broker;
pub mod client;
pub mod config;
pub mod connection;
pub mod errors;
pub mod metrics_defs;
pub mod types;

pub use broker::Broker;
pub use client::{QueueClient, QueueReceiver, QueueSender};
pub use connection::Connection;
pub use errors::QueueError;
pub use types::{Ack, LockToken, QueueMessage, ReceivedMessage};

use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run(config: config::Config) -> Result<(), QueueError> {
    let broker = Arc::new(Broker::new(config.broker));
    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    let listener = TcpListener::bind(addr).await?;
    api::serve(listener, broker).await
}
