use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use std::{collections::HashMap, env, fs};

use crate::utils::cookie::get_cookie;
use crate::utils::interpolate::interpolate_config;

/// Cookie holding the bearer token issued at login.
pub const TOKEN_COOKIE: &str = "cognito_token";

fn default_api_base_url() -> String {
    "http://localhost:8089".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    30
}

fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_testruns_poll_interval_ms() -> u64 {
    500
}

fn default_charts_interval_ms() -> u64 {
    1000
}

fn default_stats_interval_ms() -> u64 {
    1000
}

fn default_scatterplot_interval_ms() -> u64 {
    5000
}

fn default_swarm_poll_interval_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Locust web UI to read the swarm state from. Without it the swarm state
    /// must be pushed through the local HTTP surface.
    #[serde(default)]
    pub locust_url: Option<String>,
    /// Raw cookie header, the bearer token is read from its `cognito_token` entry.
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default)]
    pub http_proxy_url: Option<String>,
    #[serde(default)]
    pub http_default_headers: HashMap<String, String>,
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_testruns_poll_interval_ms")]
    pub testruns_poll_interval_ms: u64,
    #[serde(default = "default_charts_interval_ms")]
    pub charts_interval_ms: u64,
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
    #[serde(default = "default_scatterplot_interval_ms")]
    pub scatterplot_interval_ms: u64,
    #[serde(default = "default_swarm_poll_interval_ms")]
    pub swarm_poll_interval_ms: u64,
    #[serde(default)]
    pub is_graph_viewer: bool,
    /// Query string restored on start, e.g. `?testrun=...&profile=...`.
    #[serde(default)]
    pub initial_query: Option<String>,
    #[serde(default)]
    pub max_users: Option<u64>,
    #[serde(default)]
    pub users_per_worker: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_base_url: default_api_base_url(),
            locust_url: None,
            cookie: None,
            auth_token: None,
            log_level: default_log_level(),
            http_timeout_seconds: default_http_timeout_seconds(),
            http_proxy_url: None,
            http_default_headers: HashMap::new(),
            listen_address: default_listen_address(),
            testruns_poll_interval_ms: default_testruns_poll_interval_ms(),
            charts_interval_ms: default_charts_interval_ms(),
            stats_interval_ms: default_stats_interval_ms(),
            scatterplot_interval_ms: default_scatterplot_interval_ms(),
            swarm_poll_interval_ms: default_swarm_poll_interval_ms(),
            is_graph_viewer: false,
            initial_query: None,
            max_users: None,
            users_per_worker: None,
        }
    }
}

impl Settings {
    pub fn init_logging(&self) {
        env_logger::Builder::new()
            .parse_filters(&self.log_level)
            .init();
    }

    /// Bearer token for the backend: an explicit `auth_token` wins over the cookie.
    pub fn bearer_token(&self) -> Option<String> {
        if let Some(token) = self.auth_token.as_ref().filter(|t| !t.is_empty()) {
            return Some(token.clone());
        }

        self.cookie
            .as_deref()
            .and_then(|cookies| get_cookie(cookies, TOKEN_COOKIE))
    }

    pub fn testruns_poll_interval(&self) -> Duration {
        Duration::from_millis(self.testruns_poll_interval_ms)
    }

    pub fn swarm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.swarm_poll_interval_ms)
    }
}

pub fn load_config(config_dir: Option<&str>) -> Result<Settings, ConfigError> {
    let config_dir = config_dir
        .map(str::to_string)
        .or_else(|| env::var("CONFIG_DIR").ok())
        .unwrap_or_else(|| "./config".to_string());
    log::info!("Loading configuration from directory: {}", config_dir);

    let config_paths = ["config.yaml", "config.yml", "config.toml"]
        .iter()
        .map(|file| format!("{}/{}", config_dir, file))
        .collect::<Vec<String>>();

    let mut config_builder = Config::builder();

    for path_str in &config_paths {
        let path = Path::new(path_str);
        // Empty files are skipped so a placeholder does not shadow the next candidate.
        if let Ok(metadata) = fs::metadata(path) {
            if metadata.len() > 0 {
                config_builder = config_builder.add_source(File::from(path).required(false));
                log::info!("Found configuration file: {}", path.display());
                break;
            }
        }
    }

    config_builder = config_builder.add_source(Environment::with_prefix("APP").separator("__"));

    let config = config_builder.build()?;

    let mut settings = config.try_deserialize::<Settings>()?;

    interpolate_config(&mut settings);
    validate_settings(&settings)?;

    log::debug!("Configuration loaded: {:?}", settings);

    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.api_base_url.is_empty() {
        return Err(ConfigError::Message("`api_base_url` must not be empty.".to_string()));
    }

    let intervals = [
        ("testruns_poll_interval_ms", settings.testruns_poll_interval_ms),
        ("charts_interval_ms", settings.charts_interval_ms),
        ("stats_interval_ms", settings.stats_interval_ms),
        ("scatterplot_interval_ms", settings.scatterplot_interval_ms),
        ("swarm_poll_interval_ms", settings.swarm_poll_interval_ms),
    ];
    for (name, value) in intervals {
        if value == 0 {
            return Err(ConfigError::Message(format!("`{}` must be greater than zero.", name)));
        }
    }

    if settings.bearer_token().is_none() {
        log::warn!("No bearer token configured, backend requests will be sent without authorization.");
    }

    Ok(())
}
