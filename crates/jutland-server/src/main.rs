//! Jutland game server.
//!
//! Usage: `jutland-server [config.toml]`

mod actions;
mod config;
mod error;
mod ws;

use crate::actions::GameActions;
use crate::config::ServerConfig;
use crate::error::ServerError;
use jutland_core::{MovementService, SqliteStore, TerrainMap};
use jutland_network::{ActionHandler, Hub, HubEventSink};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match ServerConfig::load_or_default(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("jutland-server: {err}");
            std::process::exit(2);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run(config).await {
        error!(error = %err, "server stopped");
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let store = Arc::new(SqliteStore::open(&config.database)?);
    let catalog = Arc::new(config.catalog()?);
    let hub = Hub::spawn(config.hub_config());

    let movement = MovementService::new(
        store,
        Arc::new(TerrainMap::new(&config.map)),
        Arc::new(HubEventSink::new(hub.clone())),
    )
    .with_policy(config.emergency_fuel);
    let handler: Arc<dyn ActionHandler> = Arc::new(GameActions::new(movement, catalog));

    let listener = TcpListener::bind(&config.bind).await?;
    info!(
        bind = %config.bind,
        database = %config.database.display(),
        "jutland server listening"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(ws::serve(stream, peer, hub.clone(), handler.clone()));
                }
                Err(err) => warn!(error = %err, "accept failed"),
            },
        }
    }

    hub.shutdown().await?;
    Ok(())
}
