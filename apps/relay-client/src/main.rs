//! Relay client: prints every broadcast message and remembers the last
//! one seen, so a restart resumes without gaps or duplicates.
//!
//! Run with: cargo run -p relay-client -- --server 127.0.0.1:65432

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use relay_cursor::FileCursor;
use relay_transport::{ClientConfig, SyncClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "relay-client",
    about = "Receive relay broadcasts, resuming from the last message seen",
    version
)]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(long, value_name = "PATH", env = "RELAY_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Relay server address.
    #[arg(long, env = "RELAY_SERVER")]
    server: Option<String>,

    /// Cursor file.
    #[arg(long, value_name = "PATH", env = "RELAY_CURSOR")]
    cursor: Option<PathBuf>,

    /// Input line that disconnects the client.
    #[arg(long, value_name = "WORD")]
    quit: Option<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ClientConfig::default(),
        };
        if let Some(server) = self.server {
            config.server_addr = server;
        }
        if self.cursor.is_some() {
            config.cursor_path = self.cursor;
        }
        if let Some(quit) = self.quit {
            config.quit_command = quit;
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
    let cursor = FileCursor::new(
        config
            .cursor_path
            .clone()
            .unwrap_or_else(FileCursor::default_path),
    );
    tracing::info!(path = %cursor.path().display(), "Using cursor file");

    let mut client = SyncClient::connect(config.server_addr.as_str(), cursor, config.max_frame_len)
        .await
        .with_context(|| format!("failed to connect to {}", config.server_addr))?;

    tracing::info!("Type '{}' to disconnect", config.quit_command);

    let receive = client.run(|msg| println!(">> ID {}: {}", msg.id, msg.text));
    tokio::pin!(receive);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            result = &mut receive => {
                result.context("connection to relay failed")?;
                break;
            }
            line = input.next_line(), if stdin_open => match line {
                Ok(Some(line)) if config.is_quit(&line) => break,
                Ok(Some(_)) => {}
                // keep receiving without operator input
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = &mut shutdown => break,
        }
    }

    tracing::info!("Disconnecting");
    Ok(())
}
