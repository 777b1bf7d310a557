//! App settings and binding expressions.
//!
//! A binding value written as `%Name%` is looked up in the app settings;
//! any other value is taken literally.

use crate::errors::{FunctionError, Result};
use queue::Connection;
use std::collections::HashMap;

/// Setting holding the queue the relay writes to and the consumer reads from.
pub const QUEUE_NAME_SETTING: &str = "ServiceBusQueueName";
/// Setting holding the connection string of the queue service.
pub const CONNECTION_SETTING: &str = "ServiceBusConnection";

#[derive(Clone, Debug, Default)]
pub struct AppSettings {
    values: HashMap<String, String>,
}

impl AppSettings {
    pub fn new(values: HashMap<String, String>) -> Self {
        AppSettings { values }
    }

    /// Configured values win over `fallback` values of the same name.
    pub fn with_fallback<I>(configured: HashMap<String, String>, fallback: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut values: HashMap<String, String> = fallback.into_iter().collect();
        values.extend(configured);
        AppSettings { values }
    }

    /// Configured values first, then the process environment.
    pub fn from_config_and_env(configured: HashMap<String, String>) -> Self {
        Self::with_fallback(configured, std::env::vars())
    }

    pub fn get(&self, name: &str) -> Result<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| FunctionError::MissingSetting(name.to_string()))
    }

    pub fn resolve(&self, expression: &str) -> Result<String> {
        let inner = expression
            .strip_prefix('%')
            .and_then(|rest| rest.strip_suffix('%'));

        match inner {
            Some(name) if !name.is_empty() && !name.contains('%') => {
                self.get(name).map(str::to_string)
            }
            Some(_) => Err(FunctionError::InvalidBindingExpression(
                expression.to_string(),
            )),
            None if expression.contains('%') => Err(FunctionError::InvalidBindingExpression(
                expression.to_string(),
            )),
            None => Ok(expression.to_string()),
        }
    }
}

/// Queue a function sends to or is triggered by, as declared at registration.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueBinding {
    /// Queue name or `%Setting%` expression
    pub queue_name: String,
    /// Name of the setting holding the connection string
    pub connection: String,
}

impl QueueBinding {
    pub fn new(queue_name: impl Into<String>, connection: impl Into<String>) -> Self {
        QueueBinding {
            queue_name: queue_name.into(),
            connection: connection.into(),
        }
    }

    /// The binding shared by the relay output and the consumer trigger.
    pub fn service_bus() -> Self {
        Self::new(format!("%{QUEUE_NAME_SETTING}%"), CONNECTION_SETTING)
    }

    pub fn resolve(&self, settings: &AppSettings) -> Result<ResolvedQueueBinding> {
        let queue_name = settings.resolve(&self.queue_name)?;
        let connection = settings.get(&self.connection)?.parse::<Connection>()?;
        Ok(ResolvedQueueBinding {
            queue_name,
            connection,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedQueueBinding {
    pub queue_name: String,
    pub connection: Connection,
}
