//! saturn - network-addressable delayed-action registry.
//!
//! Startup order: tracing, CLI flags, timer registry (with its webhook
//! delivery client), then the HTTP API. On ctrl-c/SIGTERM the server stops
//! accepting requests and the registry drains in-flight firing callbacks
//! before the process exits.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use saturn_registry::{RegistryConfig, TimerRegistry};
use saturn_web::AppState;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    info!("sending events on webhook URL {}", cli.webhook_url);

    let config = RegistryConfig::new(
        cli.webhook_url.clone(),
        Duration::from_secs(cli.max_timeout_secs),
    );
    let registry = TimerRegistry::with_webhook(&config);

    let state = AppState::new(registry.clone());
    saturn_web::server::run(cli.bind, state, wait_for_shutdown()).await?;

    info!("draining outstanding timers");
    registry.shutdown().await;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve on ctrl-c or SIGTERM.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received ctrl-c, initiating graceful shutdown"),
            Err(err) => error!("failed to listen for shutdown signal: {err}"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("received SIGTERM, initiating graceful shutdown");
            }
            Err(err) => error!("failed to install SIGTERM handler: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
