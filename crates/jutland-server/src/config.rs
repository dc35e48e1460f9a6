//! Server configuration, read from a TOML file.
//!
//! Every field has a default, so a partial file (or none at all) works:
//!
//! ```toml
//! bind = "0.0.0.0:9000"
//! database = "/var/lib/jutland/jutland.db"
//! log_filter = "info,jutland_core=debug"
//!
//! [hub]
//! ping_interval_secs = 15
//!
//! [emergency_fuel]
//! duration_turns = 3
//! ```

use crate::error::ServerError;
use jutland_core::{EmergencyFuelPolicy, MapConfig, ShipCatalog};
use jutland_network::HubConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind: String,
    /// SQLite database file.
    pub database: PathBuf,
    /// Ship catalog TOML; the built-in catalog when unset.
    pub ship_catalog: Option<PathBuf>,
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    pub hub: HubSettings,
    pub map: MapConfig,
    pub emergency_fuel: EmergencyFuelPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9000".to_string(),
            database: PathBuf::from("jutland.db"),
            ship_catalog: None,
            log_filter: "info".to_string(),
            hub: HubSettings::default(),
            map: MapConfig::default(),
            emergency_fuel: EmergencyFuelPolicy::default(),
        }
    }
}

/// Hub tuning as written in the config file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    pub outbound_capacity: usize,
    pub command_capacity: usize,
    pub ping_interval_secs: u64,
    pub pong_timeout_secs: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        let hub = HubConfig::default();
        Self {
            outbound_capacity: hub.outbound_capacity,
            command_capacity: hub.command_capacity,
            ping_interval_secs: hub.ping_interval.as_secs(),
            pong_timeout_secs: hub.pong_timeout.as_secs(),
        }
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(settings: &HubSettings) -> Self {
        HubConfig {
            outbound_capacity: settings.outbound_capacity,
            command_capacity: settings.command_capacity,
            ping_interval: Duration::from_secs(settings.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(settings.pong_timeout_secs.max(1)),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ServerError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path).map_err(|source| ServerError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` when given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ServerError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig::from(&self.hub)
    }

    pub fn catalog(&self) -> Result<ShipCatalog, ServerError> {
        match &self.ship_catalog {
            Some(path) => Ok(ShipCatalog::load(path)?),
            None => Ok(ShipCatalog::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.hub_config(), HubConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let config = ServerConfig::from_toml_str(
            r#"
            bind = "0.0.0.0:9100"

            [hub]
            ping_interval_secs = 10

            [emergency_fuel]
            duration_turns = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.bind, "0.0.0.0:9100");
        assert_eq!(config.database, PathBuf::from("jutland.db"));
        assert_eq!(config.emergency_fuel.duration_turns, 3);
        let hub = config.hub_config();
        assert_eq!(hub.ping_interval, Duration::from_secs(10));
        assert_eq!(hub.outbound_capacity, 64);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            ServerConfig::from_toml_str("bind = ["),
            Err(ServerError::ParseConfig(_))
        ));
    }

    #[test]
    fn test_catalog_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[ship]]
            name = "Graf Spee"
            ship_type = "heavy_cruiser"
            faction = "german"
            speed_class = "medium"
            max_fuel = 20
            hull_boxes = 5
            "#
        )
        .unwrap();

        let config = ServerConfig {
            ship_catalog: Some(file.path().to_path_buf()),
            ..ServerConfig::default()
        };
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("Graf Spee").is_some());

        let missing = ServerConfig::load(Path::new("/nonexistent/jutland.toml"));
        assert!(matches!(missing, Err(ServerError::ReadConfig { .. })));
    }
}
