use std::env;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::config::Settings;

lazy_static! {
    static ref ENV_PLACEHOLDER: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Replaces `${VAR}` with the value of the environment variable `VAR`.
/// Unknown variables are left untouched.
pub fn interpolate(value: &str) -> String {
    ENV_PLACEHOLDER
        .replace_all(value, |caps: &Captures| {
            env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn interpolate_opt(value: &mut Option<String>) {
    if let Some(inner) = value.as_mut() {
        *inner = interpolate(inner);
    }
}

pub fn interpolate_config(settings: &mut Settings) {
    settings.api_base_url = interpolate(&settings.api_base_url);
    interpolate_opt(&mut settings.locust_url);
    interpolate_opt(&mut settings.cookie);
    interpolate_opt(&mut settings.auth_token);
    interpolate_opt(&mut settings.http_proxy_url);
    for value in settings.http_default_headers.values_mut() {
        *value = interpolate(value);
    }
}
