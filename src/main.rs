use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use modbus_to_mqtt::{
    finish_dispatcher, spawn_dispatcher, ModbusSource, MqttPublisher, Outbox, Publisher,
    Scheduler, Settings, StatusAggregator,
};

/// Pending publishes held while the broker is slow; newer ones are dropped beyond this.
const OUTBOX_CAPACITY: usize = 256;

/// How long shutdown waits for queued messages to reach the broker.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "modbus-to-mqtt")]
#[command(about = "Publish debounced Modbus input presses and bridge health over MQTT")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overriding RUST_LOG and the configured log_level (e.g. "debug")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Load and validate the configuration, print it and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref()).context("Failed to load configuration")?;

    if args.check {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    init_tracing(args.log_level.as_deref(), &settings);
    info!("Service started");

    let publisher = Arc::new(MqttPublisher::new(&settings.mqtt));
    info!("Connecting to {}", publisher.description());
    publisher.connect().await?;

    let (outbox, rx) = Outbox::channel(OUTBOX_CAPACITY);
    let dispatcher = spawn_dispatcher(publisher.clone(), rx);

    let status = StatusAggregator::new(settings.mqtt.topic_prefix(), outbox);
    let flush = status.start(settings.mqtt.repeat_interval());

    let source = Arc::new(ModbusSource::new(&settings.fieldbus));
    let scheduler = Scheduler::new(&settings.fieldbus, source, status).start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");

    scheduler.stop();
    if let Err(e) = scheduler.join().await {
        warn!("Scheduler task failed: {}", e);
    }
    flush.shutdown().await;

    // The scheduler and the flush task held the last outbox clones.
    finish_dispatcher(dispatcher, DRAIN_GRACE).await;

    info!("Service stopped");
    Ok(())
}

/// Install the global subscriber.
///
/// The filter comes from `--log-level`, then `RUST_LOG`, then the config file.
fn init_tracing(cli_level: Option<&str>, settings: &Settings) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_filter())),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
