use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Proxy};

use crate::config::Settings;

#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
    pub timeout_seconds: u64,
    pub proxy_url: Option<String>,
    pub default_headers: HashMap<String, String>,
    /// Sent as `Authorization: Bearer <token>` on every request.
    pub bearer_token: Option<String>,
}

impl From<&Settings> for HttpClientConfig {
    fn from(settings: &Settings) -> Self {
        HttpClientConfig {
            timeout_seconds: settings.http_timeout_seconds,
            proxy_url: settings.http_proxy_url.clone(),
            default_headers: settings.http_default_headers.clone(),
            bearer_token: settings.bearer_token(),
        }
    }
}

pub fn build_default_headers(config: &HttpClientConfig) -> Result<HeaderMap, String> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (key, value) in &config.default_headers {
        match (HeaderName::from_str(key), HeaderValue::from_str(value)) {
            (Ok(header_name), Ok(header_value)) => {
                headers.insert(header_name, header_value);
            }
            _ => return Err(format!("Invalid header: {}: {}", key, value)),
        }
    }

    if let Some(token) = &config.bearer_token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| format!("Invalid bearer token: {}", e))?;
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

pub fn get_client(config: Option<HttpClientConfig>) -> Result<Client, String> {
    let config = config.unwrap_or_default();
    let mut builder = Client::builder().default_headers(build_default_headers(&config)?);

    if config.timeout_seconds > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout_seconds));
    }

    if let Some(proxy_url) = &config.proxy_url {
        let proxy = Proxy::all(proxy_url).map_err(|e| format!("Invalid proxy '{}': {}", proxy_url, e))?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|e| format!("Failed to build HTTP client: {}", e))
}
