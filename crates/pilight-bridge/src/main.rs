mod cli;
mod config;
mod error;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pilight_core::Hub;

use crate::cli::Cli;
use crate::error::BridgeError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("pilight-bridge: {err}");
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), BridgeError> {
    let config = config::load(cli.config.as_deref())?;

    if cli.check {
        println!("configuration OK ({} instance(s))", config.instances.len());
        return Ok(());
    }

    let mut hubs = Vec::with_capacity(config.instances.len());
    for instance in config.instances {
        let hub = Hub::new(instance);
        info!(hub = %hub.label(), "starting hub connection");
        spawn_change_logger(&hub);
        hub.connect();
        hubs.push(hub);
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => error!(%err, "failed to listen for shutdown signal"),
    }

    for hub in &hubs {
        hub.shutdown().await;
        info!(hub = %hub.label(), "hub stopped");
    }

    Ok(())
}

/// Mirror device changes into the log until the hub shuts down.
fn spawn_change_logger(hub: &Hub) {
    let label = hub.label().to_string();
    let mut changes = hub.changes();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => match change.brightness {
                    Some(brightness) => info!(
                        hub = %label,
                        device = %change.name,
                        on = change.on,
                        brightness,
                        "device changed"
                    ),
                    None => info!(
                        hub = %label,
                        device = %change.name,
                        on = change.on,
                        "device changed"
                    ),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(hub = %label, missed, "change log fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
