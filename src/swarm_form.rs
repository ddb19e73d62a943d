//! Account-limit gating of the swarm start form.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref LEADING_NUMBER: Regex = Regex::new(r"^\s*(\d+)").unwrap();
}

/// Hours before the monthly allowance at which the form starts warning.
pub const VUH_WARNING_MARGIN: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
}

impl Alert {
    fn error(message: String) -> Self {
        Alert { level: AlertLevel::Error, message }
    }

    fn warning(message: String) -> Self {
        Alert { level: AlertLevel::Warning, message }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormGate {
    pub alert: Option<Alert>,
    pub should_disable_form: bool,
}

/// Everything the gating rules read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormLimits {
    pub num_users: Option<u64>,
    pub worker_count: u64,
    pub max_users: Option<u64>,
    pub users_per_worker: Option<u64>,
    pub max_vuh: Option<u64>,
    pub total_vuh: Option<String>,
}

/// Whole hours in a usage string such as `"46 hours"`. Anything not expressed
/// in hours (`"30 minutes"`) counts as zero.
pub fn total_vuh_hours(total_vuh: &str) -> i64 {
    if !total_vuh.contains("hours") {
        return 0;
    }

    let first_part = total_vuh.split(',').next().unwrap_or_default();
    LEADING_NUMBER
        .captures(first_part)
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .unwrap_or(0)
}

fn user_count_alert(limits: &FormLimits, user_count: u64) -> Option<Alert> {
    if let Some(max_users) = limits.max_users.filter(|max| *max > 0) {
        if user_count > max_users {
            return Some(Alert::error(
                "The number of users has exceeded the allowance for this account.".to_string(),
            ));
        }
    }

    let users_per_worker = limits.users_per_worker?;
    if user_count > limits.worker_count.saturating_mul(users_per_worker) {
        let started_with = limits
            .num_users
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        return Some(Alert::warning(format!(
            "Locust worker count is determined by the User count you specified at start up ({}), \
             and launching more users risks overloading workers, impacting your results. \
             Re-run locust-cloud with your desired user count to avoid this.",
            started_with
        )));
    }

    None
}

fn vuh_alert(limits: &FormLimits) -> Option<Alert> {
    let max_vuh = limits.max_vuh.filter(|max| *max > 0)? as i64;
    let total_vuh = limits.total_vuh.as_deref().filter(|total| !total.is_empty())?;
    let hours = total_vuh_hours(total_vuh);

    if hours >= max_vuh {
        return Some(Alert::error(format!(
            "The maximum virtual user hours for this account ({}) has been exceeded. \
             Please reach out to us at support@locust.cloud if you would like to extend your hours for this month.",
            max_vuh
        )));
    }

    if hours >= max_vuh - VUH_WARNING_MARGIN {
        return Some(Alert::warning(format!(
            "The maximum virtual user hours ({}) for this account will be reached in {} hours or less.",
            max_vuh, VUH_WARNING_MARGIN
        )));
    }

    None
}

/// Evaluates all rules. Errors outrank warnings, and within a level the
/// user-count rule outranks the VUH rule. Any error disables the form.
pub fn evaluate(limits: &FormLimits, user_count: Option<u64>) -> FormGate {
    let candidates = [
        user_count.and_then(|count| user_count_alert(limits, count)),
        vuh_alert(limits),
    ];

    let should_disable_form = candidates
        .iter()
        .flatten()
        .any(|alert| alert.level == AlertLevel::Error);

    let alert = candidates
        .iter()
        .flatten()
        .find(|alert| alert.level == AlertLevel::Error)
        .or_else(|| candidates.iter().flatten().next())
        .cloned();

    FormGate { alert, should_disable_form }
}
