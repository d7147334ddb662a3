//! Standalone node entry point.
//!
//! Usage: `pulsenet-node [config.toml]`. With no argument the built-in
//! defaults apply: data under `./data`, loopback transport, self-generated
//! pulses every ten seconds.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, Level};

use pulsenet_core::config::{self, Config};
use pulsenet_node::{Components, PulseTicker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => config::load_from_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => Config::default(),
    };

    let components = Components::build(&config).context("failed to wire components")?;
    info!(node = %components.origin.id, "components wired");

    let ticker = Arc::new(PulseTicker::new(
        components.bus.clone(),
        components.pulses.clone(),
        components.phases.clone(),
        components.pulse_duration,
    ));

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let ticker_handle = {
        let ticker = ticker.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { ticker.run(shutdown).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    shutdown.notify_waiters();
    ticker_handle.await.context("ticker task failed")?;
    Ok(())
}
