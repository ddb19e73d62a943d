use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Parses a run id or end time as written by the backend, e.g.
/// `2024-11-30 10:09:10.771147+00:00` or `2024-11-30T10:09:10`.
/// Timestamps without an offset are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.trim().replacen(' ', "T", 1);

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Human readable form used as the key of the test run map, e.g. `11/30/2024, 10:09:10 AM`.
/// Unparseable run ids are displayed verbatim.
pub fn display_timestamp(run_id: &str) -> String {
    match parse_timestamp(run_id) {
        Some(timestamp) => timestamp.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
        None => run_id.to_string(),
    }
}

pub fn to_iso_string(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_iso() -> String {
    to_iso_string(Utc::now())
}
