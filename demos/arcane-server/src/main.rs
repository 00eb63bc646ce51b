//! Reference Arcane server.
//!
//! Configuration comes from the environment (a `.env` file is honoured):
//!
//! | Variable                        | Default     |
//! |---------------------------------|-------------|
//! | `TCP_BIND_ADDRESS`              | `localhost` |
//! | `TCP_BIND_PORT`                 | `6543`      |
//! | `ARCANE_HEARTBEAT_TIMEOUT_SECS` | `60`        |
//! | `RUST_LOG`                      | `info`      |
//!
//! Runs until Ctrl-C, then shuts down cleanly.

use std::time::Duration;

use arcane::prelude::*;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 6543;

#[derive(Debug, thiserror::Error)]
enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Builds the server config from `lookup`, which maps a variable name to
/// its value.
fn config_from(lookup: impl Fn(&str) -> Option<String>) -> Result<ServerConfig, ConfigError> {
    let host = lookup("TCP_BIND_ADDRESS").unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = match lookup("TCP_BIND_PORT") {
        Some(value) => value.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
            name: "TCP_BIND_PORT",
            expected: "a port number",
            value,
        })?,
        None => DEFAULT_PORT,
    };

    let mut heartbeat = HeartbeatConfig::default();
    if let Some(value) = lookup("ARCANE_HEARTBEAT_TIMEOUT_SECS") {
        let secs = value.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
            name: "ARCANE_HEARTBEAT_TIMEOUT_SECS",
            expected: "a whole number of seconds",
            value,
        })?;
        heartbeat = heartbeat.with_timeout(Duration::from_secs(secs));
    }

    Ok(ServerConfig::default()
        .with_bind_addr(format!("{host}:{port}"))
        .with_heartbeat(heartbeat))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config_from(|name| std::env::var(name).ok())?;
    info!(
        bind = %config.bind_addr,
        heartbeat_timeout_secs = config.heartbeat.timeout.as_secs(),
        "starting arcane server"
    );

    let mut server = Server::builder()
        .config(config)
        .bootstrap(|ctx: HandlerContext<arcane::TcpConnection>| async move {
            let hello = Envelope::new(Chat::server("Connected. Send Auth to join."));
            if let Err(e) = ctx.reply(&hello).await {
                tracing::debug!(error = %e, "greeting not delivered");
            }
        })
        .build();

    server.start().await?;
    if let Some(addr) = server.local_addr() {
        info!(%addr, "listening");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    server.stop().await?;
    Ok(())
}
