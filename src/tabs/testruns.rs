use std::time::Duration;

use serde::Serialize;

use crate::api::types::{TestrunsPayload, TestrunsTableRow};
use crate::api::CloudStats;
use crate::appstate::AppState;
use crate::chart::{TestrunsResponseTime, TestrunsRps};
use crate::error::Result;
use crate::tabs::{report_first_error, Dependencies, TabFetcher};

/// Aggregates across every run of the selected profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestrunsView {
    pub table: Vec<TestrunsTableRow>,
    pub rps: TestrunsRps,
    pub response_time: TestrunsResponseTime,
}

pub struct TestrunsFetch {
    pub table: Result<Vec<TestrunsTableRow>>,
    pub rps: Result<TestrunsRps>,
    pub response_time: Result<TestrunsResponseTime>,
}

pub struct TestrunsTab {
    api: CloudStats,
}

impl TestrunsTab {
    pub fn new(api: CloudStats) -> Self {
        TestrunsTab { api }
    }
}

#[async_trait::async_trait]
impl TabFetcher for TestrunsTab {
    type Outcome = TestrunsFetch;

    fn name(&self) -> &'static str {
        "testruns"
    }

    /// Refreshed when the run list or the swarm state changes, never on a timer.
    fn interval(&self) -> Option<Duration> {
        None
    }

    fn dependencies(&self, state: &AppState) -> Dependencies {
        let mut dependencies = state.toolbar.testruns_for_display.clone();
        dependencies.push(state.swarm.state.to_string());
        dependencies
    }

    async fn fetch(&self, state: &AppState) -> Option<TestrunsFetch> {
        let payload = TestrunsPayload {
            profile: state.toolbar.profile.clone(),
        };

        let (table, rps, response_time) = futures::join!(
            self.api.testruns_table(&payload),
            self.api.testruns_rps(&payload),
            self.api.testruns_response_time(&payload),
        );

        Some(TestrunsFetch {
            table,
            rps,
            response_time,
        })
    }

    fn merge(&self, state: &mut AppState, outcome: TestrunsFetch) {
        report_first_error(
            self.name(),
            state,
            [
                outcome.table.as_ref().err(),
                outcome.rps.as_ref().err(),
                outcome.response_time.as_ref().err(),
            ],
        );

        if let Ok(table) = outcome.table {
            state.testruns.table = table;
        }
        if let Ok(rps) = outcome.rps {
            state.testruns.rps = rps;
        }
        if let Ok(response_time) = outcome.response_time {
            state.testruns.response_time = response_time;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::fake_api;
    use crate::api::Endpoint;
    use crate::swarm::SwarmState;
    use serde_json::json;

    #[test]
    fn depends_on_run_list_and_swarm_state() {
        let (_, api) = fake_api();
        let tab = TestrunsTab::new(api);
        let mut state = AppState::default();
        let before = tab.dependencies(&state);

        state.swarm.state = SwarmState::Running;
        let running = tab.dependencies(&state);
        assert_ne!(before, running);

        state.toolbar.resolution = 30;
        assert_eq!(tab.dependencies(&state), running);
    }

    #[tokio::test]
    async fn sends_profile_and_merges_aggregates() {
        let (transport, api) = fake_api();
        transport
            .respond(
                Endpoint::TestrunsTable,
                json!([{ "runId": "2024-11-30T10:09:10", "profile": "myprofile", "requests": 13 }]),
            )
            .respond(
                Endpoint::TestrunsRps,
                json!([{ "avgRps": "1.5", "avgRpsFailed": null, "time": "2024-11-30T10:09:10" }]),
            );
        let tab = TestrunsTab::new(api);
        let mut state = AppState::default();

        let outcome = tab.fetch(&state).await.unwrap();
        tab.merge(&mut state, outcome);
        assert_eq!(transport.calls_to(Endpoint::TestrunsTable)[0], json!({ "profile": null }));

        state.toolbar.profile = Some("myprofile".to_string());
        tab.fetch(&state).await.unwrap();
        assert_eq!(transport.calls_to(Endpoint::TestrunsRps)[1], json!({ "profile": "myprofile" }));

        assert_eq!(state.testruns.table[0].requests.as_deref(), Some("13"));
        assert_eq!(state.testruns.rps.avg_rps, vec![("2024-11-30T10:09:10".to_string(), "1.5".to_string())]);
        assert_eq!(state.testruns.rps.avg_rps_failed[0].1, "0");
        assert!(state.testruns.response_time.time.is_empty());
    }
}
