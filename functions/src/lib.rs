//! Function host for the HTTP-to-queue chain.
//!
//! `first_http_function` calls `second_http_function` over HTTP,
//! `second_http_function` enqueues a message, and `servicebus_queue_trigger`
//! consumes it. The host serves the HTTP functions, the admin endpoints and
//! one [`trigger::QueueTrigger`] per queue-triggered function.

pub mod api;
pub mod app;
pub mod config;
pub mod errors;
pub mod handler;
pub mod metrics_defs;
pub mod request;
pub mod service;
pub mod settings;
pub mod trigger;

#[cfg(test)]
mod testutils;

use crate::api::first_http_function::{self, FirstHttpFunction};
use crate::api::second_http_function::{self, SecondHttpFunction};
use crate::api::servicebus_queue_trigger::ServiceBusQueueTrigger;
use crate::app::{DEFAULT_METHODS, FunctionApp};
use crate::config::Config;
use crate::errors::{FunctionError, Result};
use crate::service::FunctionHostService;
use crate::settings::{AppSettings, QueueBinding};
use crate::trigger::QueueTrigger;
use queue::{Broker, QueueClient, QueueSender};
use shared::admin_service::AdminService;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tokio::task::JoinSet;

/// Registers the three functions of the chain.
pub fn build_app(config: &Config, sender: Arc<dyn QueueSender>) -> Result<FunctionApp> {
    let route_prefix = config.route_prefix();

    FunctionApp::builder(route_prefix)
        .http_function(
            first_http_function::ROUTE,
            &DEFAULT_METHODS,
            Arc::new(FirstHttpFunction::new(
                route_prefix,
                config.timeouts.outbound_http(),
            )?),
        )
        .http_function(
            second_http_function::ROUTE,
            &DEFAULT_METHODS,
            Arc::new(SecondHttpFunction::new(sender)),
        )
        .queue_trigger(
            QueueBinding::service_bus(),
            Arc::new(ServiceBusQueueTrigger::new(
                config.consumer.processing_delay(),
            )),
        )
        .build()
}

pub struct FunctionHost {
    config: Config,
    app: Arc<FunctionApp>,
    broker: Arc<Broker>,
    triggers: Vec<QueueTrigger>,
    ready: Arc<AtomicBool>,
}

impl FunctionHost {
    /// Resolves bindings against `app_settings` and the process environment.
    pub fn new(config: Config) -> Result<Self> {
        let settings = AppSettings::from_config_and_env(config.app_settings.clone());
        Self::with_settings(config, settings)
    }

    pub fn with_settings(config: Config, settings: AppSettings) -> Result<Self> {
        config.validate()?;

        let broker = Arc::new(Broker::new(config.broker.clone()));

        let output = QueueBinding::service_bus().resolve(&settings)?;
        let sender = Arc::new(QueueClient::new(
            &output.connection,
            &output.queue_name,
            &broker,
        ));
        let app = build_app(&config, sender)?;

        let triggers = app
            .queue_triggers()
            .iter()
            .map(|registration| -> Result<QueueTrigger> {
                let input = registration.binding.resolve(&settings)?;
                tracing::info!(
                    function = registration.function.name(),
                    queue = %input.queue_name,
                    "binding queue trigger"
                );
                let receiver = Arc::new(QueueClient::new(
                    &input.connection,
                    &input.queue_name,
                    &broker,
                ));
                Ok(QueueTrigger::new(
                    registration.function.clone(),
                    receiver,
                    &config.queue_trigger,
                    config.timeouts.function_timeout(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FunctionHost {
            config,
            app: Arc::new(app),
            broker,
            triggers,
            ready: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn app(&self) -> &FunctionApp {
        &self.app
    }

    /// The broker behind `inprocess` connections.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Serves functions on `listener` and `/health` and `/ready` on
    /// `admin_listener`, and runs every queue trigger. Only returns on error.
    pub async fn serve(self, listener: TcpListener, admin_listener: TcpListener) -> Result<()> {
        for (pattern, name) in self.app.http_routes() {
            tracing::info!(function = name, route = pattern, "http function");
        }

        let service =
            FunctionHostService::new(self.app.clone(), self.config.timeouts.function_timeout());

        let ready = self.ready.clone();
        let admin = AdminService::new(move || ready.load(Ordering::Relaxed));

        let mut triggers = JoinSet::new();
        for trigger in self.triggers {
            triggers.spawn(Arc::new(trigger).run());
        }

        self.ready.store(true, Ordering::Relaxed);

        let trigger_task = async move {
            while let Some(joined) = triggers.join_next().await {
                joined.map_err(|e| {
                    FunctionError::InternalError(format!("queue trigger stopped: {e}"))
                })?;
            }
            Ok::<(), FunctionError>(())
        };

        tokio::try_join!(
            shared::http::serve(listener, service),
            shared::http::serve::<_, FunctionError>(admin_listener, admin),
            trigger_task,
        )?;
        Ok(())
    }
}

pub async fn run(config: Config) -> Result<()> {
    let host = FunctionHost::new(config)?;
    let listener = TcpListener::bind(host.config.listener.addr()).await?;
    let admin_listener = TcpListener::bind(host.config.admin_listener.addr()).await?;
    host.serve(listener, admin_listener).await
}
