//! Relay server: every line typed on stdin is broadcast to connected
//! clients; reconnecting clients are caught up from history first.
//!
//! Run with: cargo run -p relay-server -- --bind 0.0.0.0:65432

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use relay_core::Hub;
use relay_transport::{RelayServer, ServerConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "relay-server",
    about = "Broadcast stdin lines to TCP clients with history catch-up",
    version
)]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(long, value_name = "PATH", env = "RELAY_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<SocketAddr>,

    /// Hold broadcasting until this many clients are live.
    #[arg(long, value_name = "N")]
    wait_for_clients: Option<usize>,

    /// Pause between replayed messages.
    #[arg(long, value_name = "MS")]
    replay_pace_ms: Option<u64>,

    /// Give up waiting for a client's sync request after this long.
    #[arg(long, value_name = "MS")]
    cursor_timeout_ms: Option<u64>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(n) = self.wait_for_clients {
            config.wait_for_clients = n;
        }
        if let Some(ms) = self.replay_pace_ms {
            config.replay_pace_ms = ms;
        }
        if self.cursor_timeout_ms.is_some() {
            config.cursor_timeout_ms = self.cursor_timeout_ms;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let bind_addr = config.bind_addr;
    let quorum = config.wait_for_clients;

    let hub = Arc::new(Hub::with_max_text_len(config.max_text_len()));
    let server = RelayServer::bind(config, Arc::clone(&hub))
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!("Relay listening on {}", server.local_addr()?);
    let accept_task = server.spawn();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    if quorum > 0 {
        tracing::info!("Waiting for {quorum} client(s) before broadcasting");
        tokio::select! {
            () = hub.wait_for_clients(quorum) => {
                tracing::info!("Required clients connected, broadcasting enabled");
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                accept_task.abort();
                return Ok(());
            }
        }
    }

    tracing::info!("Type a message and press Enter to broadcast it");
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else { break };
                if let Err(e) = hub.publish(&line) {
                    tracing::debug!("Input not published: {e}");
                }
            }
            _ = &mut shutdown => break,
        }
    }

    tracing::info!(stored = hub.history().len(), "Shutting down");
    accept_task.abort();
    Ok(())
}
