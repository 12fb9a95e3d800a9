//! # Cipher Relay
//!
//! Entry point: load configuration from the environment, initialise
//! logging, and serve until Ctrl+C.
//!
//! ## Environment
//!
//! - `APP_PORT` - listen port (default 5000)
//! - `RELAY_HOST` - bind address (default 0.0.0.0)
//! - `RELAY_POLICY` - `immediate`, `redirect` or `session`
//! - `RELAY_CIPHER_SHIFT`, `RELAY_ROTATE_DIGITS` - cipher policy
//! - `RELAY_CONFIG` - optional JSON config file
//! - `RELAY_LOG_LEVEL` / `RUST_LOG` - log filter (default `info`)

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cipher_relay::{RelayConfig, RelayService, VERSION};

fn init_logging() -> Result<()> {
    let filter = std::env::var("RELAY_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    info!(version = VERSION, "Cipher relay starting");

    let config = RelayConfig::from_env().context("failed to load configuration")?;
    let service = Arc::new(RelayService::new(config).context("invalid configuration")?);

    let signal_service = Arc::clone(&service);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_service.shutdown(),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    service.start().await?;
    Ok(())
}
