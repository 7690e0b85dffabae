//! rpsls - unified CLI

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command};
use rpsls::{
    AppState, ConnectionRegistry, GameService, GameStore, MemoryStore, Outcome, Play,
    ServerConfig, SqliteStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            host,
            db_path,
        } => run_server(config, host, port, db_path).await,
        Command::Resolve { first, second } => resolve(&first, &second),
    }
}

/// Run the WebSocket game server
async fn run_server(
    config_path: Option<std::path::PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    db_path: Option<String>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => ServerConfig::from_file(&path)?,
        None => ServerConfig::default(),
    }
    .with_overrides(host, port, db_path);

    let store: Arc<dyn GameStore> = match config.db_path() {
        Some(path) => {
            info!(path = %path, "Using SQLite store");
            let store = SqliteStore::open(path.clone())?.with_ttl(config.game_ttl());
            store.purge_expired().await?;
            Arc::new(store)
        }
        None => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::with_ttl(config.game_ttl()))
        }
    };

    let registry = ConnectionRegistry::new();
    let service = GameService::from_config(store, Arc::new(registry.clone()), &config);
    let state = AppState::new(service, registry);

    info!(host = %config.host(), port = config.port(), "Starting rpsls server");
    rpsls::serve(config.host(), *config.port(), state)
        .await
        .context("server failed")
}

/// Print one resolution
fn resolve(first: &str, second: &str) -> Result<()> {
    let (Some(a), Some(b)) = (Play::parse(first), Play::parse(second)) else {
        bail!("plays must be one of rock, paper, scissors, lizard, spock");
    };
    let outcome = Outcome::between(a, b);
    println!("{}", outcome.summary(a, b));
    Ok(())
}
