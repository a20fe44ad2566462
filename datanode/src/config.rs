use figment::{
    providers::{Format, Yaml},
    Figment,
};
use once_cell::sync::Lazy;
use serde::Deserialize;

fn default_datanode_addr() -> String {
    "0.0.0.0:50052".to_owned()
}
fn default_metaserver_addr() -> String {
    "127.0.0.1:50051".to_owned()
}
fn default_storage_path() -> String {
    "./datanode_storage".to_owned()
}
fn default_storage_capacity() -> i64 {
    10 * 1024 * 1024 * 1024
}
fn default_heartbeat_period_secs() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_owned()
}
fn default_log_base() -> String {
    "logs".to_owned()
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_datanode_addr")]
    pub datanode_addr: String,
    #[serde(default = "default_metaserver_addr")]
    pub metaserver_addr: String,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    // bytes
    #[serde(default = "default_storage_capacity")]
    pub storage_capacity: i64,
    #[serde(default = "default_heartbeat_period_secs")]
    pub heartbeat_period_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_base")]
    pub log_base: String,
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    let config_file_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| format!("./datanode/config/{env}.yaml"));
    Figment::new()
        .merge(Yaml::file(config_file_path))
        .extract()
        .unwrap()
});
