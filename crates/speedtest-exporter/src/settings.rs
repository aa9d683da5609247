use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub exporter: ExporterSettings,
    #[serde(default)]
    pub speedtest: SpeedtestSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub saving_mode: bool,
    #[serde(default = "default_graceful_shutdown")]
    pub graceful_shutdown: bool,
    #[serde(default = "default_graceful_shutdown_timeout_secs")]
    pub graceful_shutdown_timeout_secs: u64,
    #[serde(default)]
    pub process_metrics: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedtestSettings {
    #[serde(default = "default_config_url")]
    pub config_url: String,
    #[serde(default = "default_servers_url")]
    pub servers_url: String,
    #[serde(default = "default_max_targets")]
    pub max_targets: usize,
    /// Server ids to measure. Empty means default selection (closest first).
    #[serde(default)]
    pub filter: Vec<String>,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            run_timeout_secs: default_run_timeout_secs(),
            interval_secs: default_interval_secs(),
            saving_mode: false,
            graceful_shutdown: default_graceful_shutdown(),
            graceful_shutdown_timeout_secs: default_graceful_shutdown_timeout_secs(),
            process_metrics: false,
        }
    }
}

impl Default for SpeedtestSettings {
    fn default() -> Self {
        Self {
            config_url: default_config_url(),
            servers_url: default_servers_url(),
            max_targets: default_max_targets(),
            filter: Vec::new(),
        }
    }
}

impl ExporterSettings {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_timeout_secs)
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = std::env::var("ST_ENV").unwrap_or_else(|_| "default".to_string());
        Self::load(env)
    }

    pub fn load(env: String) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file("config/default.toml"));

        // Environment-specific configuration if it exists
        let env_config_path = format!("config/{env}.toml");
        if std::path::Path::new(&env_config_path).exists() {
            figment = figment.merge(Toml::file(&env_config_path));
        }

        // Local overrides if present (git-ignored)
        let local_config_path = "config/local.toml";
        if std::path::Path::new(local_config_path).exists() {
            figment = figment.merge(Toml::file(local_config_path));
        }

        // Environment variables can still override
        figment = figment.merge(Env::prefixed("ST_").split("__"));

        let config: Settings = figment.extract()?;
        Ok(config)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("static addr")
}

fn default_run_timeout_secs() -> u64 {
    60
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_graceful_shutdown() -> bool {
    true
}

fn default_graceful_shutdown_timeout_secs() -> u64 {
    10
}

fn default_config_url() -> String {
    "https://www.speedtest.net/speedtest-config.php".to_string()
}

fn default_servers_url() -> String {
    "https://www.speedtest.net/api/js/servers?engine=js".to_string()
}

fn default_max_targets() -> usize {
    1
}
