pub mod types;

use std::sync::Arc;

use log::{debug, error};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::chart::{
    adapt_per_name_chart_data, adapt_request_lines, adapt_rps, adapt_testruns_response_time,
    adapt_testruns_rps, PerRequestSeries, RequestLine, RpsData, TestrunsResponseTime, TestrunsRps,
    DEFAULT_FALLBACK,
};
use crate::error::{DashboardError, Result};
use types::*;

/// Every `cloud-stats` endpoint the dashboard talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    RequestNames,
    Rps,
    RpsPerRequest,
    AvgResponseTimes,
    ErrorsPerRequest,
    Perc99ResponseTimes,
    ResponseLength,
    Scatterplot,
    Requests,
    Failures,
    TotalRequests,
    TotalFailures,
    ErrorPercentage,
    Testruns,
    TestrunsTable,
    TestrunsRps,
    TestrunsResponseTime,
    Profiles,
    Customer,
    TotalVuh,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::RequestNames => "/cloud-stats/request-names",
            Endpoint::Rps => "/cloud-stats/rps",
            Endpoint::RpsPerRequest => "/cloud-stats/rps-per-request",
            Endpoint::AvgResponseTimes => "/cloud-stats/avg-response-times",
            Endpoint::ErrorsPerRequest => "/cloud-stats/errors-per-request",
            Endpoint::Perc99ResponseTimes => "/cloud-stats/perc99-response-times",
            Endpoint::ResponseLength => "/cloud-stats/response-length",
            Endpoint::Scatterplot => "/cloud-stats/scatterplot",
            Endpoint::Requests => "/cloud-stats/requests",
            Endpoint::Failures => "/cloud-stats/failures",
            Endpoint::TotalRequests => "/cloud-stats/total-requests",
            Endpoint::TotalFailures => "/cloud-stats/total-failures",
            Endpoint::ErrorPercentage => "/cloud-stats/error-percentage",
            Endpoint::Testruns => "/cloud-stats/testruns",
            Endpoint::TestrunsTable => "/cloud-stats/testruns-table",
            Endpoint::TestrunsRps => "/cloud-stats/testruns-rps",
            Endpoint::TestrunsResponseTime => "/cloud-stats/testruns-response-time",
            Endpoint::Profiles => "/cloud-stats/profiles",
            Endpoint::Customer => "/cloud-stats/customer",
            Endpoint::TotalVuh => "/cloud-stats/total-vuh",
        }
    }
}

/// Per-request timeseries endpoints, named by the metric column they return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKey {
    Throughput,
    ResponseTime,
    ErrorRate,
    Perc99,
    ResponseLength,
    ScatterplotResponseTime,
}

impl MetricKey {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            MetricKey::Throughput => Endpoint::RpsPerRequest,
            MetricKey::ResponseTime => Endpoint::AvgResponseTimes,
            MetricKey::ErrorRate => Endpoint::ErrorsPerRequest,
            MetricKey::Perc99 => Endpoint::Perc99ResponseTimes,
            MetricKey::ResponseLength => Endpoint::ResponseLength,
            MetricKey::ScatterplotResponseTime => Endpoint::Scatterplot,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            MetricKey::Throughput => "throughput",
            MetricKey::ResponseTime | MetricKey::ScatterplotResponseTime => "responseTime",
            MetricKey::ErrorRate => "errorRate",
            MetricKey::Perc99 => "perc99",
            MetricKey::ResponseLength => "responseLength",
        }
    }

    /// Percentile and length charts keep gaps as `null` instead of zero.
    pub fn fallback(&self) -> Option<&'static str> {
        match self {
            MetricKey::Perc99 | MetricKey::ResponseLength => None,
            _ => DEFAULT_FALLBACK,
        }
    }
}

/// Raw transport: POST a JSON body, get back the response rows.
#[async_trait::async_trait]
pub trait StatsTransport {
    async fn post(&self, endpoint: Endpoint, body: Value) -> Result<Vec<Value>>;
}

/// POSTs to `{base_url}{path}` with the client's default headers, which carry the bearer token.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(client: Client, base_url: &str) -> Self {
        HttpTransport {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl StatsTransport for HttpTransport {
    async fn post(&self, endpoint: Endpoint, body: Value) -> Result<Vec<Value>> {
        let path = endpoint.path();
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {} {}", url, body);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| DashboardError::Transport {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("'{}' responded with HTTP status {}", path, status.as_u16());
            return Err(DashboardError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(|source| DashboardError::Transport {
            path: path.to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| DashboardError::Decode {
            path: path.to_string(),
            source,
        })?;

        Ok(match value {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        })
    }
}

fn decode<T: DeserializeOwned>(endpoint: Endpoint, rows: Vec<Value>) -> Result<Vec<T>> {
    serde_json::from_value(Value::Array(rows)).map_err(|source| DashboardError::Decode {
        path: endpoint.path().to_string(),
        source,
    })
}

/// Single-row endpoints answer `[]` while there is nothing to report yet.
/// That is a successful empty fetch, not an error.
fn first_row<T>(rows: Vec<T>) -> Option<T> {
    rows.into_iter().next()
}

/// Typed `cloud-stats` client. Each method validates the rows once and returns
/// them already shaped for the view that consumes them.
#[derive(Clone)]
pub struct CloudStats {
    transport: Arc<dyn StatsTransport + Send + Sync>,
}

impl CloudStats {
    pub fn new(transport: Arc<dyn StatsTransport + Send + Sync>) -> Self {
        CloudStats { transport }
    }

    pub fn over_http(client: Client, base_url: &str) -> Self {
        CloudStats::new(Arc::new(HttpTransport::new(client, base_url)))
    }

    pub async fn fetch_query<B, T>(&self, endpoint: Endpoint, body: &B) -> Result<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|source| DashboardError::Decode {
            path: endpoint.path().to_string(),
            source,
        })?;
        let rows = self.transport.post(endpoint, body).await?;
        decode(endpoint, rows)
    }

    pub async fn testruns(&self) -> Result<Vec<TestrunResponse>> {
        self.fetch_query(Endpoint::Testruns, &serde_json::json!({})).await
    }

    pub async fn profiles(&self) -> Result<Vec<String>> {
        let rows: Vec<ProfileRow> = self.fetch_query(Endpoint::Profiles, &serde_json::json!({})).await?;
        Ok(rows.into_iter().map(|row| row.profile).collect())
    }

    pub async fn request_names(&self, body: &RequestBody) -> Result<Vec<RequestLine>> {
        let rows: Vec<RequestNameRow> = self.fetch_query(Endpoint::RequestNames, body).await?;
        Ok(adapt_request_lines(&rows))
    }

    pub async fn rps(&self, body: &RequestBody) -> Result<RpsData> {
        let rows: Vec<RpsRow> = self.fetch_query(Endpoint::Rps, body).await?;
        Ok(adapt_rps(&rows))
    }

    pub async fn per_request(&self, metric: MetricKey, body: &RequestBody) -> Result<PerRequestSeries> {
        let rows: Vec<PerRequestRow> = self.fetch_query(metric.endpoint(), body).await?;
        Ok(adapt_per_name_chart_data(&rows, metric.column(), metric.fallback()))
    }

    pub async fn requests(&self, body: &RequestBody) -> Result<Vec<StatsRow>> {
        self.fetch_query(Endpoint::Requests, body).await
    }

    pub async fn failures(&self, body: &RequestBody) -> Result<Vec<FailureRow>> {
        self.fetch_query(Endpoint::Failures, body).await
    }

    pub async fn total_requests(&self, body: &RequestBody) -> Result<Option<f64>> {
        let rows: Vec<TotalRequestsRow> = self.fetch_query(Endpoint::TotalRequests, body).await?;
        Ok(first_row(rows).map(|row| row.total_requests))
    }

    pub async fn total_failures(&self, body: &RequestBody) -> Result<Option<f64>> {
        let rows: Vec<TotalFailuresRow> = self.fetch_query(Endpoint::TotalFailures, body).await?;
        Ok(first_row(rows).map(|row| row.total_failures))
    }

    pub async fn error_percentage(&self, body: &RequestBody) -> Result<Option<f64>> {
        let rows: Vec<ErrorPercentageRow> = self.fetch_query(Endpoint::ErrorPercentage, body).await?;
        Ok(first_row(rows).map(|row| row.error_percentage))
    }

    pub async fn testruns_table(&self, payload: &TestrunsPayload) -> Result<Vec<TestrunsTableRow>> {
        self.fetch_query(Endpoint::TestrunsTable, payload).await
    }

    pub async fn testruns_rps(&self, payload: &TestrunsPayload) -> Result<TestrunsRps> {
        let rows: Vec<TestrunsRpsRow> = self.fetch_query(Endpoint::TestrunsRps, payload).await?;
        Ok(adapt_testruns_rps(&rows))
    }

    pub async fn testruns_response_time(&self, payload: &TestrunsPayload) -> Result<TestrunsResponseTime> {
        let rows: Vec<TestrunsResponseTimeRow> =
            self.fetch_query(Endpoint::TestrunsResponseTime, payload).await?;
        Ok(adapt_testruns_response_time(&rows))
    }

    pub async fn customer(&self) -> Result<Option<CustomerRow>> {
        let rows: Vec<CustomerRow> = self.fetch_query(Endpoint::Customer, &serde_json::json!({})).await?;
        Ok(first_row(rows))
    }

    pub async fn total_vuh(&self) -> Result<Option<String>> {
        let rows: Vec<TotalVuhRow> = self.fetch_query(Endpoint::TotalVuh, &serde_json::json!({})).await?;
        Ok(first_row(rows).and_then(|row| row.total_vuh))
    }
}
