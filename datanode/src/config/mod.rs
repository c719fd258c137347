use std::time::Duration;

use figment::{
    Figment,
    providers::{Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub datanode_id: String,
    pub namenode_addrs: String,
    // where the block server binds
    pub listen_addrs: String,
    // what the namenode is told to dial back
    pub advertised_address: String,
    pub advertised_port: u16,
    pub storage_path: String,
    pub heartbeat_interval_secs: u64,
    pub io_timeout_secs: u64,
    pub register_retries: u8,
    pub log_level: String,
    pub log_base: String,
    pub apm_endpoint: Option<String>,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            datanode_id: "datanode-1".to_string(),
            namenode_addrs: "127.0.0.1:5007".to_string(),
            listen_addrs: "0.0.0.0:6001".to_string(),
            advertised_address: "127.0.0.1".to_string(),
            advertised_port: 6001,
            storage_path: "./temp/datanode-1".to_string(),
            heartbeat_interval_secs: 3,
            io_timeout_secs: 10,
            register_retries: 5,
            log_level: "info".to_string(),
            log_base: "./temp/datanode-1/logs/".to_string(),
            apm_endpoint: None,
        }
    }
}
impl Config {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

pub fn load_config() -> Result<Config, figment::Error> {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    let config_file_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| format!("./datanode/config/{}.yaml", env));
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Yaml::file(config_file_path))
        .extract()
}
