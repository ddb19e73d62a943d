use std::time::Duration;

use serde::Serialize;

use crate::api::types::RequestBody;
use crate::api::{CloudStats, MetricKey};
use crate::appstate::AppState;
use crate::chart::{should_replace_lines, PerRequestSeries, RequestLine, RpsData};
use crate::error::Result;
use crate::swarm::SwarmState;
use crate::tabs::{report_first_error, Dependencies, TabFetcher};
use crate::utils::time::now_iso;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartsView {
    pub request_lines: Vec<RequestLine>,
    pub rps_data: RpsData,
    pub avg_response_times: PerRequestSeries,
    pub rps_per_request: PerRequestSeries,
    pub errors_per_request: PerRequestSeries,
    pub perc99_response_times: PerRequestSeries,
    pub response_length: PerRequestSeries,
    /// Set when the request lines changed and the chart legend must be rebuilt.
    pub should_replace_merge_lines: bool,
    pub is_loading: bool,
    /// "There was a problem loading some graphs for this testrun."
    pub is_error: bool,
}

impl Default for ChartsView {
    fn default() -> Self {
        ChartsView {
            request_lines: Vec::new(),
            rps_data: RpsData::default(),
            avg_response_times: PerRequestSeries::default(),
            rps_per_request: PerRequestSeries::default(),
            errors_per_request: PerRequestSeries::default(),
            perc99_response_times: PerRequestSeries::default(),
            response_length: PerRequestSeries::default(),
            should_replace_merge_lines: false,
            is_loading: true,
            is_error: false,
        }
    }
}

/// Query window for the current run: a finished run's window is fixed at its
/// end time, a running one extends to now.
pub fn charts_payload(state: &AppState) -> Option<RequestBody> {
    let run_id = state.toolbar.current_testrun.clone()?;
    let end = state
        .toolbar
        .current()
        .and_then(|testrun| testrun.end_time.clone())
        .unwrap_or_else(now_iso);

    Some(RequestBody {
        start: Some(run_id.clone()),
        end: Some(end),
        resolution: Some(state.toolbar.resolution),
        testrun: Some(run_id),
    })
}

pub struct AdvancedCharts {
    pub rps_per_request: Result<PerRequestSeries>,
    pub errors_per_request: Result<PerRequestSeries>,
    pub perc99_response_times: Result<PerRequestSeries>,
    pub response_length: Result<PerRequestSeries>,
}

pub struct ChartsFetch {
    pub request_lines: Result<Vec<RequestLine>>,
    pub rps_data: Result<RpsData>,
    pub avg_response_times: Result<PerRequestSeries>,
    pub advanced: Option<AdvancedCharts>,
    testrun_index: Option<usize>,
    swarm_state: SwarmState,
}

pub struct ChartsTab {
    api: CloudStats,
    interval: Duration,
}

impl ChartsTab {
    pub fn new(api: CloudStats, interval: Duration) -> Self {
        ChartsTab { api, interval }
    }

    async fn fetch_advanced(&self, payload: &RequestBody) -> AdvancedCharts {
        let (rps_per_request, errors_per_request, perc99_response_times, response_length) = futures::join!(
            self.api.per_request(MetricKey::Throughput, payload),
            self.api.per_request(MetricKey::ErrorRate, payload),
            self.api.per_request(MetricKey::Perc99, payload),
            self.api.per_request(MetricKey::ResponseLength, payload),
        );

        AdvancedCharts {
            rps_per_request,
            errors_per_request,
            perc99_response_times,
            response_length,
        }
    }
}

#[async_trait::async_trait]
impl TabFetcher for ChartsTab {
    type Outcome = ChartsFetch;

    fn name(&self) -> &'static str {
        "charts"
    }

    fn interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn dependencies(&self, state: &AppState) -> Dependencies {
        vec![
            state.toolbar.current_testrun.clone().unwrap_or_default(),
            state.toolbar.resolution.to_string(),
            state.toolbar.should_show_advanced.to_string(),
        ]
    }

    fn on_swarm_change(&self, state: &mut AppState, _previous: SwarmState) {
        // A new run is about to produce data.
        if state.swarm.state == SwarmState::Running {
            state.charts.is_loading = true;
        }
    }

    async fn fetch(&self, state: &AppState) -> Option<ChartsFetch> {
        let payload = charts_payload(state)?;

        let advanced = async {
            if state.toolbar.should_show_advanced {
                Some(self.fetch_advanced(&payload).await)
            } else {
                None
            }
        };

        let (request_lines, rps_data, avg_response_times, advanced) = futures::join!(
            self.api.request_names(&payload),
            self.api.rps(&payload),
            self.api.per_request(MetricKey::ResponseTime, &payload),
            advanced,
        );

        Some(ChartsFetch {
            request_lines,
            rps_data,
            avg_response_times,
            advanced,
            testrun_index: state.toolbar.current_testrun_index,
            swarm_state: state.swarm.state,
        })
    }

    fn merge(&self, state: &mut AppState, outcome: ChartsFetch) {
        let advanced_errors = outcome
            .advanced
            .as_ref()
            .map(|advanced| {
                vec![
                    advanced.rps_per_request.as_ref().err(),
                    advanced.errors_per_request.as_ref().err(),
                    advanced.perc99_response_times.as_ref().err(),
                    advanced.response_length.as_ref().err(),
                ]
            })
            .unwrap_or_default();
        let errors = [
            outcome.request_lines.as_ref().err(),
            outcome.rps_data.as_ref().err(),
            outcome.avg_response_times.as_ref().err(),
        ]
        .into_iter()
        .chain(advanced_errors);
        report_first_error(self.name(), state, errors);

        let view = &mut state.charts;

        if let Ok(request_lines) = outcome.request_lines {
            // The newest run has no data yet while it is starting up.
            let is_fresh_run =
                outcome.testrun_index == Some(0) && outcome.swarm_state == SwarmState::Running;
            if request_lines.is_empty() && !is_fresh_run {
                view.is_error = true;
            }

            let replace = should_replace_lines(&view.request_lines, &request_lines);
            if replace {
                view.request_lines = request_lines;
            }
            view.should_replace_merge_lines = replace;
            view.is_loading = false;
        }

        if let Ok(rps_data) = outcome.rps_data {
            view.rps_data = rps_data;
        }
        if let Ok(avg_response_times) = outcome.avg_response_times {
            view.avg_response_times = avg_response_times;
        }

        if let Some(advanced) = outcome.advanced {
            if let Ok(series) = advanced.rps_per_request {
                view.rps_per_request = series;
            }
            if let Ok(series) = advanced.errors_per_request {
                view.errors_per_request = series;
            }
            if let Ok(series) = advanced.perc99_response_times {
                view.perc99_response_times = series;
            }
            if let Ok(series) = advanced.response_length {
                view.response_length = series;
            }
        }
    }
}
