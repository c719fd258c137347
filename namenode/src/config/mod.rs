use std::time::Duration;

use figment::{
    Figment,
    providers::{Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::placement::PlacementSettings;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub id: String,
    pub listen_addrs: String,
    pub block_size: u64,
    pub replication_factor: usize,
    // a datanode silent for longer than this is marked dead by the sweep
    pub heartbeat_timeout_secs: u64,
    pub liveness_sweep_interval_secs: u64,
    pub client_io_timeout_secs: u64,
    pub datanode_io_timeout_secs: u64,
    pub log_level: String,
    pub log_base: String,
    pub apm_endpoint: Option<String>,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            id: "namenode".to_string(),
            listen_addrs: "0.0.0.0:5007".to_string(),
            block_size: 1024,
            replication_factor: 2,
            heartbeat_timeout_secs: 10,
            liveness_sweep_interval_secs: 5,
            client_io_timeout_secs: 30,
            datanode_io_timeout_secs: 10,
            log_level: "info".to_string(),
            log_base: "./temp/namenode/".to_string(),
            apm_endpoint: None,
        }
    }
}
impl Config {
    pub fn placement_settings(&self) -> PlacementSettings {
        PlacementSettings::new(self.block_size, self.replication_factor)
    }
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
    pub fn liveness_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_sweep_interval_secs.max(1))
    }
    pub fn client_io_timeout(&self) -> Duration {
        Duration::from_secs(self.client_io_timeout_secs)
    }
    pub fn datanode_io_timeout(&self) -> Duration {
        Duration::from_secs(self.datanode_io_timeout_secs)
    }
}

/// Serialized defaults overridden by `<ENV>.yaml` (or the file named by
/// `CONFIG_PATH`).
pub fn load_config() -> Result<Config, figment::Error> {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    let config_file_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| format!("./namenode/config/{}.yaml", env));
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Yaml::file(config_file_path))
        .extract()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.block_size, 1024);
        assert_eq!(config.replication_factor, 2);
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(10));
    }
}
