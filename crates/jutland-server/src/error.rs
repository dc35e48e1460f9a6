//! Server startup and runtime errors.

use jutland_core::{CatalogError, StoreError};
use jutland_network::HubError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    ParseConfig(#[from] toml::de::Error),
    #[error("ship catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("storage: {0}")]
    Store(#[from] StoreError),
    #[error("network: {0}")]
    Io(#[from] std::io::Error),
    #[error("hub: {0}")]
    Hub(#[from] HubError),
}
