use std::time::Duration;

use serde::Serialize;

use crate::api::types::{FailureRow, RequestBody, StatsRow};
use crate::api::CloudStats;
use crate::appstate::AppState;
use crate::error::Result;
use crate::swarm::SwarmState;
use crate::tabs::{report_first_error, Dependencies, TabFetcher};
use crate::utils::time::now_iso;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub stats: Vec<StatsRow>,
    pub failures: Vec<FailureRow>,
    pub total_requests: Option<f64>,
    pub total_failures: Option<f64>,
    pub error_percentage: Option<f64>,
}

/// The newest run is read up to now while the swarm is running, even if the
/// backend already reports an end time for it.
pub fn stats_payload(state: &AppState) -> Option<RequestBody> {
    let run_id = state.toolbar.current_testrun.clone()?;
    let end_time = state
        .toolbar
        .current()
        .and_then(|testrun| testrun.end_time.clone());
    let is_live = state.swarm.state == SwarmState::Running && state.toolbar.current_testrun_index == Some(0);

    let end = match end_time {
        Some(end_time) if !is_live => end_time,
        _ => now_iso(),
    };

    Some(RequestBody {
        start: Some(run_id.clone()),
        end: Some(end),
        resolution: None,
        testrun: Some(run_id),
    })
}

pub struct StatsFetch {
    pub stats: Result<Vec<StatsRow>>,
    pub failures: Result<Vec<FailureRow>>,
    pub total_requests: Result<Option<f64>>,
    pub total_failures: Result<Option<f64>>,
    pub error_percentage: Result<Option<f64>>,
}

pub struct StatsTab {
    api: CloudStats,
    interval: Duration,
}

impl StatsTab {
    pub fn new(api: CloudStats, interval: Duration) -> Self {
        StatsTab { api, interval }
    }
}

#[async_trait::async_trait]
impl TabFetcher for StatsTab {
    type Outcome = StatsFetch;

    fn name(&self) -> &'static str {
        "stats"
    }

    fn interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn dependencies(&self, state: &AppState) -> Dependencies {
        vec![state.toolbar.current_testrun.clone().unwrap_or_default()]
    }

    async fn fetch(&self, state: &AppState) -> Option<StatsFetch> {
        let payload = stats_payload(state)?;

        let (stats, failures, total_requests, total_failures, error_percentage) = futures::join!(
            self.api.requests(&payload),
            self.api.failures(&payload),
            self.api.total_requests(&payload),
            self.api.total_failures(&payload),
            self.api.error_percentage(&payload),
        );

        Some(StatsFetch {
            stats,
            failures,
            total_requests,
            total_failures,
            error_percentage,
        })
    }

    fn merge(&self, state: &mut AppState, outcome: StatsFetch) {
        report_first_error(
            self.name(),
            state,
            [
                outcome.stats.as_ref().err(),
                outcome.failures.as_ref().err(),
                outcome.total_requests.as_ref().err(),
                outcome.total_failures.as_ref().err(),
                outcome.error_percentage.as_ref().err(),
            ],
        );

        let view = &mut state.stats;
        if let Ok(stats) = outcome.stats {
            view.stats = stats;
        }
        if let Ok(failures) = outcome.failures {
            view.failures = failures;
        }
        // An empty response leaves the previous totals in place.
        if let Ok(Some(total)) = outcome.total_requests {
            view.total_requests = Some(total);
        }
        if let Ok(Some(total)) = outcome.total_failures {
            view.total_failures = Some(total);
        }
        if let Ok(Some(percentage)) = outcome.error_percentage {
            view.error_percentage = Some(percentage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::fake_api;
    use crate::api::Endpoint;
    use crate::appstate::{Testrun, TestrunMap};
    use serde_json::json;

    const RUN_ID: &str = "2024-11-30T10:09:10";
    const END_TIME: &str = "2024-11-30T11:00:37";

    fn state(swarm_state: SwarmState, index: usize) -> AppState {
        let mut state = AppState::default();
        let mut testruns = TestrunMap::new();
        testruns.insert(
            "run".to_string(),
            Testrun {
                run_id: RUN_ID.to_string(),
                end_time: Some(END_TIME.to_string()),
                index,
                profile: None,
                locustfile: None,
            },
        );
        state.toolbar.testruns = testruns;
        state.toolbar.current_testrun = Some(RUN_ID.to_string());
        state.toolbar.current_testrun_index = Some(index);
        state.swarm.state = swarm_state;
        state
    }

    #[test]
    fn live_run_window_extends_to_now() {
        let finished = stats_payload(&state(SwarmState::Stopped, 0)).unwrap();
        assert_eq!(finished.end.as_deref(), Some(END_TIME));
        assert_eq!(finished.resolution, None);

        let older = stats_payload(&state(SwarmState::Running, 1)).unwrap();
        assert_eq!(older.end.as_deref(), Some(END_TIME));

        let live = stats_payload(&state(SwarmState::Running, 0)).unwrap();
        assert_ne!(live.end.as_deref(), Some(END_TIME));
    }

    #[tokio::test]
    async fn merges_tables_and_totals() {
        let (transport, api) = fake_api();
        transport
            .respond(
                Endpoint::Requests,
                json!([{ "method": "GET", "name": "/", "average": "12.5", "requests": "13", "failed": "None" }]),
            )
            .respond(Endpoint::TotalRequests, json!([{ "totalRequests": 13 }]))
            .respond(Endpoint::TotalFailures, json!([{ "totalFailures": "1" }]))
            .respond(Endpoint::ErrorPercentage, json!([{ "errorPercentage": 7.69 }]));
        let tab = StatsTab::new(api, Duration::from_secs(1));
        let mut state = state(SwarmState::Stopped, 0);

        let outcome = tab.fetch(&state).await.unwrap();
        tab.merge(&mut state, outcome);

        assert_eq!(state.stats.stats.len(), 1);
        assert_eq!(state.stats.stats[0].failed, None);
        assert!(state.stats.failures.is_empty());
        assert_eq!(state.stats.total_requests, Some(13.0));
        assert_eq!(state.stats.total_failures, Some(1.0));
        assert_eq!(state.stats.error_percentage, Some(7.69));
        assert_eq!(state.snackbar.message, None);
    }

    #[tokio::test]
    async fn missing_totals_surface_one_error() {
        let (transport, api) = fake_api();
        transport.fail(Endpoint::Failures, 500);
        let tab = StatsTab::new(api, Duration::from_secs(1));
        let mut state = state(SwarmState::Stopped, 0);

        let outcome = tab.fetch(&state).await.unwrap();
        tab.merge(&mut state, outcome);

        let message = state.snackbar.message.unwrap();
        assert!(message.contains("/cloud-stats/failures"));
        assert_eq!(state.stats.total_requests, None);
    }

    #[tokio::test]
    async fn fresh_run_without_rows_is_not_an_error() {
        let (_transport, api) = fake_api();
        let tab = StatsTab::new(api, Duration::from_secs(1));
        let mut state = state(SwarmState::Running, 0);

        let outcome = tab.fetch(&state).await.unwrap();
        tab.merge(&mut state, outcome);

        assert_eq!(state.snackbar.message, None);
        assert!(state.stats.stats.is_empty());
        assert_eq!(state.stats.total_requests, None);
        assert_eq!(state.stats.total_failures, None);
        assert_eq!(state.stats.error_percentage, None);
    }

    #[tokio::test]
    async fn empty_totals_keep_the_previous_values() {
        let (transport, api) = fake_api();
        transport.respond(Endpoint::TotalRequests, json!([{ "totalRequests": 13 }]));
        let tab = StatsTab::new(api, Duration::from_secs(1));
        let mut state = state(SwarmState::Running, 0);
        state.stats.total_failures = Some(2.0);

        let outcome = tab.fetch(&state).await.unwrap();
        tab.merge(&mut state, outcome);

        assert_eq!(state.stats.total_requests, Some(13.0));
        assert_eq!(state.stats.total_failures, Some(2.0));
        assert_eq!(state.snackbar.message, None);
    }

    #[tokio::test]
    async fn nothing_to_fetch_without_a_run() {
        let (transport, api) = fake_api();
        let tab = StatsTab::new(api, Duration::from_secs(1));

        assert!(tab.fetch(&AppState::default()).await.is_none());
        assert!(transport.calls.lock().unwrap().is_empty());
    }
}
