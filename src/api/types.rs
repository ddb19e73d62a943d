use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Reads a metric cell. The backend stringifies every column, so numbers may
/// arrive as `"12.5"` or `12.5`, and missing values as `null`, `""` or `"None"`.
pub(crate) fn metric_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() || s == "None" => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn metric<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(metric_from_value(&value))
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(metric_from_value(&value).and_then(|s| s.trim().parse::<f64>().ok()).map(|n| n as u64))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(metric_from_value(&value)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or_default())
}

/// Body sent to every per-testrun endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testrun: Option<String>,
}

/// Body of the cross-run aggregate endpoints; `profile` is sent as `null` when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestrunsPayload {
    pub profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestrunResponse {
    pub run_id: String,
    #[serde(default, deserialize_with = "metric")]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub profile: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub locustfile: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestNameRow {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRow {
    pub profile: String,
}

/// A `{ name, time, <metric> }` row. The metric column depends on the endpoint
/// and is looked up through [`crate::api::MetricKey`].
#[derive(Debug, Clone, Deserialize)]
pub struct PerRequestRow {
    pub name: String,
    pub time: String,
    #[serde(flatten)]
    pub values: HashMap<String, Value>,
}

impl PerRequestRow {
    pub fn value(&self, column: &str) -> Option<String> {
        self.values.get(column).and_then(metric_from_value)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpsRow {
    #[serde(default, deserialize_with = "metric")]
    pub users: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub rps: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub error_rate: Option<String>,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRow {
    #[serde(default, deserialize_with = "metric")]
    pub method: Option<String>,
    pub name: String,
    #[serde(default, deserialize_with = "metric")]
    pub average: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub requests: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub failed: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub min: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub max: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub error_percentage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRow {
    pub name: String,
    #[serde(default, deserialize_with = "metric")]
    pub exception: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub count: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalRequestsRow {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_requests: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalFailuresRow {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_failures: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPercentageRow {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub error_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestrunsTableRow {
    pub run_id: String,
    #[serde(default, deserialize_with = "metric")]
    pub profile: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub locustfile: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub arguments: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub num_users: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub worker_count: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub requests: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub resp_time: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub rps_avg: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub fail_ratio: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub exit_code: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub run_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestrunsRpsRow {
    #[serde(default, deserialize_with = "metric")]
    pub avg_rps: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub avg_rps_failed: Option<String>,
    pub time: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestrunsResponseTimeRow {
    #[serde(default, deserialize_with = "metric")]
    pub avg_response_time: Option<String>,
    #[serde(default, deserialize_with = "metric")]
    pub avg_response_time_failed: Option<String>,
    pub time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRow {
    #[serde(default, deserialize_with = "metric")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub max_users: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub max_vuh: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub max_workers: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub users_per_worker: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalVuhRow {
    #[serde(default, deserialize_with = "metric")]
    pub total_vuh: Option<String>,
}
