use queue::config::{
    BrokerSettings, MAX_RECEIVE_WAIT_SECS, ValidationError as BrokerValidationError,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("route_prefix must not be empty")]
    EmptyRoutePrefix,

    #[error("{0} must be greater than 0")]
    ZeroValue(&'static str),

    #[error("queue_trigger.receive_wait_secs must be between 1 and {MAX_RECEIVE_WAIT_SECS}")]
    InvalidReceiveWait,

    #[error("in-process broker: {0}")]
    Broker(#[from] BrokerValidationError),
}

/// Function host configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for function invocations
    #[serde(default = "default_listener")]
    pub listener: Listener,
    /// Listener for `/health` and `/ready`
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    /// First path segment of every HTTP function route
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
    /// Settings consulted by binding expressions before the process environment
    #[serde(default)]
    pub app_settings: HashMap<String, String>,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub queue_trigger: QueueTriggerConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    /// Policy of the broker used by `inprocess` connections
    #[serde(default)]
    pub broker: BrokerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: default_listener(),
            admin_listener: default_admin_listener(),
            route_prefix: default_route_prefix(),
            app_settings: HashMap::new(),
            timeouts: Timeouts::default(),
            queue_trigger: QueueTriggerConfig::default(),
            consumer: ConsumerConfig::default(),
            broker: BrokerSettings::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.route_prefix().is_empty() {
            return Err(ValidationError::EmptyRoutePrefix);
        }
        if self.timeouts.outbound_http_secs == 0 {
            return Err(ValidationError::ZeroValue("timeouts.outbound_http_secs"));
        }
        if self.timeouts.function_timeout_secs == 0 {
            return Err(ValidationError::ZeroValue("timeouts.function_timeout_secs"));
        }
        if self.queue_trigger.max_concurrent_calls == 0 {
            return Err(ValidationError::ZeroValue(
                "queue_trigger.max_concurrent_calls",
            ));
        }
        let wait = self.queue_trigger.receive_wait_secs;
        if wait == 0 || wait > MAX_RECEIVE_WAIT_SECS {
            return Err(ValidationError::InvalidReceiveWait);
        }

        self.broker.validate()?;
        Ok(())
    }

    /// The route prefix without surrounding slashes.
    pub fn route_prefix(&self) -> &str {
        self.route_prefix.trim().trim_matches('/')
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Timeouts {
    /// Applies to the whole outbound call made by the entry function.
    #[serde(default = "default_outbound_http_secs")]
    pub outbound_http_secs: u64,
    /// Upper bound for any single function invocation.
    #[serde(default = "default_function_timeout_secs")]
    pub function_timeout_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            outbound_http_secs: default_outbound_http_secs(),
            function_timeout_secs: default_function_timeout_secs(),
        }
    }
}

impl Timeouts {
    pub fn outbound_http(&self) -> Duration {
        Duration::from_secs(self.outbound_http_secs)
    }

    pub fn function_timeout(&self) -> Duration {
        Duration::from_secs(self.function_timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct QueueTriggerConfig {
    /// Messages processed at the same time by one trigger
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    /// Long-poll duration of a single receive
    #[serde(default = "default_receive_wait_secs")]
    pub receive_wait_secs: u64,
}

impl Default for QueueTriggerConfig {
    fn default() -> Self {
        QueueTriggerConfig {
            max_concurrent_calls: default_max_concurrent_calls(),
            receive_wait_secs: default_receive_wait_secs(),
        }
    }
}

impl QueueTriggerConfig {
    pub fn receive_wait(&self) -> Duration {
        Duration::from_secs(self.receive_wait_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ConsumerConfig {
    /// Simulated processing time of the queue consumer
    #[serde(default = "default_processing_delay_secs")]
    pub processing_delay_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            processing_delay_secs: default_processing_delay_secs(),
        }
    }
}

impl ConsumerConfig {
    pub fn processing_delay(&self) -> Duration {
        Duration::from_secs(self.processing_delay_secs)
    }
}

fn default_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 7071,
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 7072,
    }
}

fn default_route_prefix() -> String {
    "api".into()
}

fn default_outbound_http_secs() -> u64 {
    30
}

fn default_function_timeout_secs() -> u64 {
    300
}

fn default_max_concurrent_calls() -> usize {
    16
}

fn default_receive_wait_secs() -> u64 {
    5
}

fn default_processing_delay_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
listener:
    host: "0.0.0.0"
    port: 8071
admin_listener:
    host: "127.0.0.1"
    port: 8072
route_prefix: /api/
app_settings:
    ServiceBusQueueName: chain-queue
    ServiceBusConnection: inprocess
timeouts:
    outbound_http_secs: 10
queue_trigger:
    max_concurrent_calls: 4
consumer:
    processing_delay_secs: 1
broker:
    max_delivery_count: 5
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.listener.addr(), "0.0.0.0:8071");
        assert_eq!(config.route_prefix(), "api");
        assert_eq!(config.app_settings["ServiceBusQueueName"], "chain-queue");
        assert_eq!(config.timeouts.outbound_http(), Duration::from_secs(10));
        assert_eq!(config.timeouts.function_timeout_secs, 300);
        assert_eq!(config.queue_trigger.max_concurrent_calls, 4);
        assert_eq!(config.queue_trigger.receive_wait_secs, 5);
        assert_eq!(config.consumer.processing_delay_secs, 1);
        assert_eq!(config.broker.max_delivery_count, 5);
        assert_eq!(config.broker.lock_duration_secs, 30);
    }

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listener.port, 7071);
        assert_eq!(config.admin_listener.port, 7072);
        assert_eq!(config.consumer.processing_delay_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let base_config = Config::default();

        let mut config = base_config.clone();
        config.listener.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        let mut config = base_config.clone();
        config.route_prefix = "/".into();
        assert_eq!(config.validate(), Err(ValidationError::EmptyRoutePrefix));

        let mut config = base_config.clone();
        config.queue_trigger.max_concurrent_calls = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::ZeroValue(_))
        ));

        let mut config = base_config.clone();
        config.queue_trigger.receive_wait_secs = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidReceiveWait));

        let mut config = base_config.clone();
        config.queue_trigger.receive_wait_secs = MAX_RECEIVE_WAIT_SECS + 1;
        assert_eq!(config.validate(), Err(ValidationError::InvalidReceiveWait));

        let mut config = base_config.clone();
        config.queue_trigger.receive_wait_secs = MAX_RECEIVE_WAIT_SECS;
        assert!(config.validate().is_ok());

        let mut config = base_config.clone();
        config.broker.lock_duration_secs = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Broker(_))
        ));

        let mut config = base_config.clone();
        config.timeouts.function_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::ZeroValue(_))
        ));

        let mut config = base_config;
        config.broker.max_delivery_count = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Broker(_))
        ));
    }

    #[test]
    fn test_deserialization_errors() {
        assert!(serde_yaml::from_str::<Config>("listener: {host: \"0.0.0.0\"}").is_err());
        assert!(
            serde_yaml::from_str::<Config>("listener: {host: \"0.0.0.0\", port: \"x\"}").is_err()
        );
    }
}
