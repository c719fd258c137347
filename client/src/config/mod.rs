use std::time::Duration;

use figment::{
    Figment,
    providers::{self, Format, Serialized},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub client_id: String,
    pub namenode_addrs: String,
    // uploads and downloads run inside one request, keep this generous
    pub io_timeout_secs: u64,
    pub log_level: String,
    pub log_base: String,
    pub apm_endpoint: Option<String>,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: "client-0".to_string(),
            namenode_addrs: "127.0.0.1:5007".to_string(),
            io_timeout_secs: 60,
            log_level: "warn".to_string(),
            log_base: "./temp/client/".to_string(),
            apm_endpoint: None,
        }
    }
}
impl Config {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

pub fn load_config() -> Result<Config, figment::Error> {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    // giving defaule path to root of binary
    let config_file_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| format!("./client/config/{}.yaml", env));
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(providers::Yaml::file(config_file_path))
        .extract()
}
