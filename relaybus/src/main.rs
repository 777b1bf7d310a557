mod config;

use clap::{Parser, Subcommand};
use config::CommonConfig;
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const METRICS_PREFIX: &str = "relaybus";

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the HTTP functions and run the queue trigger
    Functions(ConfigArgs),
    /// Serve a standalone queue broker over HTTP
    QueueBroker(ConfigArgs),
}

#[derive(clap::Args)]
struct ConfigArgs {
    #[arg(long)]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum RelaybusError {
    #[error("missing `{0}` section in config")]
    MissingSection(&'static str),
    #[error("invalid queue broker config: {0}")]
    InvalidQueueBrokerConfig(#[from] queue::config::ValidationError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error(transparent)]
    Functions(#[from] functions::errors::FunctionError),
    #[error(transparent)]
    Queue(#[from] queue::QueueError),
}

fn main() {
    let cli = Cli::parse();

    let (section, path) = match &cli.command {
        CliCommand::Functions(args) => ("functions", &args.config),
        CliCommand::QueueBroker(args) => ("queue_broker", &args.config),
    };

    let config = match config::Config::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let _sentry = init_logging(&config.common);

    if let Err(e) = run(cli.command, config) {
        tracing::error!(service = section, error = %e, "exiting");
        process::exit(1);
    }
}

/// Keeps the Sentry client alive for as long as the returned guard lives.
fn init_logging(common: &CommonConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = common
        .logging
        .as_ref()
        .and_then(|logging| match logging.sentry_dsn.parse::<sentry::types::Dsn>() {
            Ok(dsn) => Some(dsn),
            Err(e) => {
                eprintln!("ignoring invalid sentry_dsn: {e}");
                None
            }
        });

    let sentry = dsn.map(|dsn| {
        sentry::init(sentry::ClientOptions {
            dsn: Some(dsn),
            release: sentry::release_name!(),
            ..Default::default()
        })
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    sentry
}

fn init_metrics(common: &CommonConfig) -> Result<(), RelaybusError> {
    let Some(metrics_config) = &common.metrics else {
        return Ok(());
    };

    let recorder = StatsdBuilder::from(&metrics_config.statsd_host, metrics_config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| RelaybusError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| RelaybusError::Metrics(e.to_string()))?;

    tracing::info!(
        host = %metrics_config.statsd_host,
        port = metrics_config.statsd_port,
        "statsd metrics enabled"
    );
    Ok(())
}

#[tokio::main]
async fn run(command: CliCommand, config: config::Config) -> Result<(), RelaybusError> {
    init_metrics(&config.common)?;

    match command {
        CliCommand::Functions(_) => {
            let functions_config = config
                .functions
                .ok_or(RelaybusError::MissingSection("functions"))?;

            shared::metrics_defs::describe_all(functions::metrics_defs::ALL_METRICS);
            shared::metrics_defs::describe_all(queue::metrics_defs::ALL_METRICS);

            tracing::info!("Starting functions host");
            functions::run(functions_config).await?;
        }
        CliCommand::QueueBroker(_) => {
            let broker_config = config
                .queue_broker
                .ok_or(RelaybusError::MissingSection("queue_broker"))?;
            broker_config.validate()?;

            shared::metrics_defs::describe_all(queue::metrics_defs::ALL_METRICS);

            tracing::info!("Starting queue broker");
            queue::run(broker_config).await?;
        }
    }

    Ok(())
}
