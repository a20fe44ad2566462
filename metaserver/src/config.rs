use figment::{
    providers::{Format, Yaml},
    Figment,
};
use once_cell::sync::Lazy;
use serde::Deserialize;

fn default_listen_addr() -> String {
    "0.0.0.0:50051".to_owned()
}
fn default_cache_capacity() -> usize {
    1000
}
fn default_sweep_interval_secs() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_owned()
}
fn default_log_base() -> String {
    "logs".to_owned()
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_base")]
    pub log_base: String,
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    let config_file_path = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| format!("./metaserver/config/{env}.yaml"));
    Figment::new()
        .merge(Yaml::file(config_file_path))
        .extract()
        .unwrap()
});
