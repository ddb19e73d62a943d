//! Reshaping of flat backend rows into chart series.
//!
//! The backend returns one row per `(name, time bucket)`. Charts want one
//! series per request name, each a list of `[time, value]` points, plus a
//! shared time axis.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::api::types::{
    PerRequestRow, RequestNameRow, RpsRow, TestrunsResponseTimeRow, TestrunsRpsRow,
};
use crate::utils::time::{parse_timestamp, to_iso_string};

/// Value used for a missing metric unless the caller asks otherwise.
pub const DEFAULT_FALLBACK: Option<&str> = Some("0");

/// `[time, value]`; `None` serializes as `null` so charts can tell "no data" from zero.
pub type ChartPoint = (String, Option<String>);

/// One series per request name plus the shared time axis. Series are keyed
/// under `series` so a request named `time` cannot shadow the axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerRequestSeries {
    pub series: BTreeMap<String, Vec<ChartPoint>>,
    pub time: Vec<String>,
}

impl PerRequestSeries {
    pub fn get(&self, name: &str) -> Option<&Vec<ChartPoint>> {
        self.series.get(name)
    }
}

/// A line definition handed to the chart: display name and the series key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLine {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpsData {
    pub users: Vec<(String, String)>,
    pub rps: Vec<(String, String)>,
    pub error_rate: Vec<(String, String)>,
    pub time: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestrunsRps {
    pub avg_rps: Vec<(String, String)>,
    pub avg_rps_failed: Vec<(String, String)>,
    pub time: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestrunsResponseTime {
    pub avg_response_time: Vec<(String, String)>,
    pub avg_response_time_failed: Vec<(String, String)>,
    pub time: Vec<String>,
}

fn normalize_time(time: &str) -> String {
    parse_timestamp(time)
        .map(to_iso_string)
        .unwrap_or_else(|| time.to_string())
}

/// Groups `rows` by name. Every row appends one point to its name's series and
/// one entry to the time axis; a missing `column` value becomes `fallback`.
pub fn adapt_per_name_chart_data(
    rows: &[PerRequestRow],
    column: &str,
    fallback: Option<&str>,
) -> PerRequestSeries {
    rows.iter().fold(PerRequestSeries::default(), |mut chart, row| {
        let time = normalize_time(&row.time);
        let value = row.value(column).or_else(|| fallback.map(str::to_string));

        chart.time.push(time.clone());
        chart
            .series
            .entry(row.name.clone())
            .or_default()
            .push((time, value));
        chart
    })
}

/*
  Because of gap-filled time buckets it's possible to have periods without data.
  Rather than displaying gaps in the chart, the last known value is carried.
*/
fn carry_last_value(values: &[(String, String)]) -> String {
    values
        .last()
        .map(|(_, value)| value.clone())
        .unwrap_or_else(|| "0".to_string())
}

pub fn adapt_rps(rows: &[RpsRow]) -> RpsData {
    rows.iter().fold(RpsData::default(), |mut chart, row| {
        let time = normalize_time(&row.time);
        let users = row
            .users
            .clone()
            .unwrap_or_else(|| carry_last_value(&chart.users));

        chart.users.push((time.clone(), users));
        chart
            .rps
            .push((time.clone(), row.rps.clone().unwrap_or_else(|| "0".to_string())));
        chart.error_rate.push((
            time.clone(),
            row.error_rate.clone().unwrap_or_else(|| "0".to_string()),
        ));
        chart.time.push(time);
        chart
    })
}

pub fn adapt_testruns_rps(rows: &[TestrunsRpsRow]) -> TestrunsRps {
    rows.iter().fold(TestrunsRps::default(), |mut chart, row| {
        chart.avg_rps.push((row.time.clone(), row.avg_rps.clone().unwrap_or_else(|| "0".to_string())));
        chart.avg_rps_failed.push((
            row.time.clone(),
            row.avg_rps_failed.clone().unwrap_or_else(|| "0".to_string()),
        ));
        chart.time.push(row.time.clone());
        chart
    })
}

pub fn adapt_testruns_response_time(rows: &[TestrunsResponseTimeRow]) -> TestrunsResponseTime {
    rows.iter().fold(TestrunsResponseTime::default(), |mut chart, row| {
        chart.avg_response_time.push((
            row.time.clone(),
            row.avg_response_time.clone().unwrap_or_else(|| "0".to_string()),
        ));
        chart.avg_response_time_failed.push((
            row.time.clone(),
            row.avg_response_time_failed.clone().unwrap_or_else(|| "0".to_string()),
        ));
        chart.time.push(row.time.clone());
        chart
    })
}

pub fn adapt_request_lines(rows: &[RequestNameRow]) -> Vec<RequestLine> {
    rows.iter()
        .map(|row| RequestLine {
            name: row.name.clone(),
            key: row.name.clone(),
        })
        .collect()
}

/// True when the chart legend must be rebuilt: the set or order of names changed.
pub fn should_replace_lines(current: &[RequestLine], incoming: &[RequestLine]) -> bool {
    current.len() != incoming.len()
        || incoming
            .iter()
            .zip(current)
            .any(|(incoming, current)| incoming.key != current.key)
}

pub fn round_to_decimal_places(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Tooltip value of a `[time, value]` point, rounded to two places.
pub fn chart_value_formatter(point: &ChartPoint) -> Option<f64> {
    point
        .1
        .as_deref()
        .and_then(|value| value.parse::<f64>().ok())
        .map(|value| round_to_decimal_places(value, 2))
}
