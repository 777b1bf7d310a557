use serde::Deserialize;
use std::time::Duration;

/// Longest lock a receiver can hold on a message.
pub const MAX_LOCK_DURATION_SECS: u64 = 300;
/// Longest a single receive call waits for a message.
pub const MAX_RECEIVE_WAIT_SECS: u64 = 60;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("lock_duration_secs must be between 1 and {MAX_LOCK_DURATION_SECS}")]
    InvalidLockDuration,

    #[error("max_delivery_count must be greater than 0")]
    InvalidMaxDeliveryCount,
}

/// Delivery policy shared by every queue of a broker.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BrokerSettings {
    /// How long a received message stays invisible to other receivers.
    #[serde(default = "default_lock_duration_secs")]
    pub lock_duration_secs: u64,
    /// Deliveries after which an abandoned or expired message is dead-lettered.
    #[serde(default = "default_max_delivery_count")]
    pub max_delivery_count: u32,
}

fn default_lock_duration_secs() -> u64 {
    30
}

fn default_max_delivery_count() -> u32 {
    10
}

impl Default for BrokerSettings {
    fn default() -> Self {
        BrokerSettings {
            lock_duration_secs: default_lock_duration_secs(),
            max_delivery_count: default_max_delivery_count(),
        }
    }
}

impl BrokerSettings {
    pub fn lock_duration(&self) -> Duration {
        Duration::from_secs(self.lock_duration_secs.min(MAX_LOCK_DURATION_SECS))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lock_duration_secs == 0 || self.lock_duration_secs > MAX_LOCK_DURATION_SECS {
            return Err(ValidationError::InvalidLockDuration);
        }
        if self.max_delivery_count == 0 {
            return Err(ValidationError::InvalidMaxDeliveryCount);
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 7080,
        }
    }
}

/// Configuration of a standalone broker process.
#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default)]
    pub broker: BrokerSettings,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.listener.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        self.broker.validate()
    }
}
