use thiserror::Error;

/// Errors surfaced by the dashboard's transport and configuration layers.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Failed to reach '{path}': {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("'{path}' responded with HTTP status {status}")]
    Status { path: String, status: u16 },

    #[error("Could not decode response from '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
