use reqwest::Url;
use serde::{Deserialize, Serialize};

const QUERY_BASE: &str = "http://dashboard.local/";

/// The query-string surface of the dashboard: `?testrun=&profile=&showAdvanced=&tab=`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlState {
    pub testrun: Option<String>,
    pub profile: Option<String>,
    pub show_advanced: Option<bool>,
    pub tab: Option<String>,
}

/// A single `pushQuery` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    Testrun(String),
    Profile(String),
    ShowAdvanced(bool),
    Tab(String),
}

impl UrlState {
    /// Reads a query string with or without its leading `?`. Unknown keys are ignored.
    pub fn parse(query: &str) -> UrlState {
        let mut state = UrlState::default();
        let Ok(mut url) = Url::parse(QUERY_BASE) else {
            return state;
        };
        url.set_query(Some(query.trim_start_matches('?')));

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "testrun" => state.testrun = Some(value.into_owned()),
                "profile" => state.profile = Some(value.into_owned()),
                "showAdvanced" => state.show_advanced = Some(value == "true"),
                "tab" => state.tab = Some(value.into_owned()),
                _ => {}
            }
        }

        state
    }

    pub fn push(&mut self, param: QueryParam) {
        match param {
            QueryParam::Testrun(testrun) => self.testrun = Some(testrun),
            QueryParam::Profile(profile) => {
                self.profile = Some(profile).filter(|profile| !profile.is_empty())
            }
            QueryParam::ShowAdvanced(show) => self.show_advanced = Some(show),
            QueryParam::Tab(tab) => self.tab = Some(tab),
        }
    }

    /// Serializes back into a shareable query string, `?` included.
    pub fn to_query_string(&self) -> String {
        let Ok(mut url) = Url::parse(QUERY_BASE) else {
            return String::new();
        };

        {
            let mut pairs = url.query_pairs_mut();
            if let Some(testrun) = &self.testrun {
                pairs.append_pair("testrun", testrun);
            }
            if let Some(profile) = &self.profile {
                pairs.append_pair("profile", profile);
            }
            if let Some(show) = self.show_advanced {
                pairs.append_pair("showAdvanced", if show { "true" } else { "false" });
            }
            if let Some(tab) = &self.tab {
                pairs.append_pair("tab", tab);
            }
        }

        url.query()
            .filter(|query| !query.is_empty())
            .map(|query| format!("?{}", query))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys() {
        let state = UrlState::parse("?testrun=11%2F30%2F2024%2C+10%3A09%3A10+AM&profile=myprofile&showAdvanced=true&tab=charts&other=1");

        assert_eq!(state.testrun.as_deref(), Some("11/30/2024, 10:09:10 AM"));
        assert_eq!(state.profile.as_deref(), Some("myprofile"));
        assert_eq!(state.show_advanced, Some(true));
        assert_eq!(state.tab.as_deref(), Some("charts"));
    }

    #[test]
    fn push_then_serialize_is_readable_again() {
        let mut state = UrlState::parse("profile=myprofile");
        state.push(QueryParam::Testrun("10/30/2024, 6:00:44 AM".to_string()));
        state.push(QueryParam::ShowAdvanced(false));

        let reparsed = UrlState::parse(&state.to_query_string());

        assert_eq!(reparsed, state);
    }

    #[test]
    fn empty_state_has_empty_query() {
        assert_eq!(UrlState::default().to_query_string(), "");
        assert_eq!(UrlState::parse(""), UrlState::default());
    }
}
