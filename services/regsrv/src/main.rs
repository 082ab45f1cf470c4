use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use regsrv::app::{assemble, Assembly};
use regsrv::bootstrap::{init_logging, Args};
use regsrv::{MqttPublisher, PollDriver, PollSettings, RegSrvConfig};

/// Inbound commands buffered between driver passes
const COMMAND_QUEUE: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args).context("Failed to initialize logging")?;

    let config = RegSrvConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if args.validate {
        info!("Configuration {} is valid", args.config.display());
        return Ok(());
    }

    info!("Starting register bridge service v{}", env!("CARGO_PKG_VERSION"));
    let stop = common::shutdown_token();

    let Assembly {
        devices,
        transports,
    } = assemble(&config).context("Failed to build devices")?;

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
    let publisher = Arc::new(MqttPublisher::start(&config.mqtt, commands_tx));

    let driver = PollDriver::new(
        devices,
        transports,
        publisher,
        commands_rx,
        PollSettings::from_config(&config),
    );
    driver.run(stop).await;

    Ok(())
}
