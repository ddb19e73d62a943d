use std::time::Duration;

use serde::Serialize;

use crate::api::types::RequestBody;
use crate::api::{CloudStats, MetricKey};
use crate::appstate::AppState;
use crate::chart::{PerRequestSeries, RequestLine};
use crate::error::Result;
use crate::tabs::{report_first_error, Dependencies, TabFetcher};
use crate::utils::time::now_iso;

/// Scatter of individual response times. Both fields stay `None` until the
/// first successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScatterplotView {
    pub request_lines: Option<Vec<RequestLine>>,
    pub scatterplot: Option<PerRequestSeries>,
}

pub fn scatterplot_payload(state: &AppState) -> Option<RequestBody> {
    let run_id = state.toolbar.current_testrun.clone()?;
    Some(RequestBody {
        start: Some(run_id.clone()),
        end: Some(now_iso()),
        resolution: None,
        testrun: Some(run_id),
    })
}

pub struct ScatterplotFetch {
    pub request_lines: Result<Vec<RequestLine>>,
    pub scatterplot: Result<PerRequestSeries>,
}

pub struct ScatterplotTab {
    api: CloudStats,
    interval: Duration,
}

impl ScatterplotTab {
    pub fn new(api: CloudStats, interval: Duration) -> Self {
        ScatterplotTab { api, interval }
    }
}

#[async_trait::async_trait]
impl TabFetcher for ScatterplotTab {
    type Outcome = ScatterplotFetch;

    fn name(&self) -> &'static str {
        "scatterplot"
    }

    fn interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn dependencies(&self, state: &AppState) -> Dependencies {
        vec![state.toolbar.current_testrun.clone().unwrap_or_default()]
    }

    async fn fetch(&self, state: &AppState) -> Option<ScatterplotFetch> {
        let payload = scatterplot_payload(state)?;

        let (request_lines, scatterplot) = futures::join!(
            self.api.request_names(&payload),
            self.api.per_request(MetricKey::ScatterplotResponseTime, &payload),
        );

        Some(ScatterplotFetch {
            request_lines,
            scatterplot,
        })
    }

    fn merge(&self, state: &mut AppState, outcome: ScatterplotFetch) {
        report_first_error(
            self.name(),
            state,
            [outcome.request_lines.as_ref().err(), outcome.scatterplot.as_ref().err()],
        );

        if let Ok(request_lines) = outcome.request_lines {
            state.scatterplot.request_lines = Some(request_lines);
        }
        if let Ok(scatterplot) = outcome.scatterplot {
            state.scatterplot.scatterplot = Some(scatterplot);
        }
    }
}
