use std::collections::HashMap;

/// Splits a `Cookie` header value into its key/value pairs.
pub fn parse_cookies(cookies: &str) -> HashMap<String, String> {
    cookies
        .split(';')
        .filter_map(|cookie| {
            let cookie = cookie.trim();
            if cookie.is_empty() {
                return None;
            }
            let (key, value) = cookie.split_once('=').unwrap_or((cookie, ""));
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

pub fn get_cookie(cookies: &str, key: &str) -> Option<String> {
    parse_cookies(cookies).remove(key).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_token_among_other_cookies() {
        let cookies = "theme=dark; cognito_token=eyJ.abc=; session=1";
        // Only the first '=' separates key and value.
        assert_eq!(get_cookie(cookies, "cognito_token").as_deref(), Some("eyJ.abc="));
        assert_eq!(get_cookie(cookies, "session").as_deref(), Some("1"));
    }

    #[test]
    fn missing_or_empty_cookie_is_none() {
        assert_eq!(get_cookie("", "cognito_token"), None);
        assert_eq!(get_cookie("cognito_token=", "cognito_token"), None);
        assert_eq!(get_cookie("flag", "cognito_token"), None);
    }
}
