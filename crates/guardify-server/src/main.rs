//! # guardify-server
//!
//! HTTP server for guardify, the Bluetooth tag tracker.
//!
//! This binary provides:
//! - REST API for tracking sessions, buzzer control and tracked objects
//! - Alert events as server-sent events
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package guardify-server
//!
//! # Without a Bluetooth adapter
//! cargo run --package guardify-server --no-default-features --features mock-bluetooth
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::sync::Arc;

use anyhow::Context;
use guardify_core::GuardifyConfig;
use guardify_server::{api, logging, state::AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GuardifyConfig::load().context("Failed to load configuration")?;
    logging::init(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.logging.environment,
        "Starting guardify-server"
    );
    let bind_address = config.server.bind_address.clone();

    let state = Arc::new(
        AppState::from_config(config)
            .await
            .context("Failed to initialize Bluetooth")?,
    );
    let app = api::create_router(state.clone());

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;

    info!(address = %bind_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.tracker.stop().await;
    info!("Tracking stopped, exiting");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
