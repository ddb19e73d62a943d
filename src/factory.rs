use std::sync::Arc;
use std::time::Duration;

use log::info;
use reqwest::Client;
use tokio::task::JoinHandle;

use crate::api::CloudStats;
use crate::appstate::{AppState, Store};
use crate::config::Settings;
use crate::error::{DashboardError, Result};
use crate::swarm::poll_swarm_state;
use crate::tabs::charts::ChartsTab;
use crate::tabs::customer::{CustomerDefaults, CustomerTab};
use crate::tabs::run_tab;
use crate::tabs::scatterplot::ScatterplotTab;
use crate::tabs::stats::StatsTab;
use crate::tabs::testruns::TestrunsTab;
use crate::testruns::TestrunPoller;
use crate::utils::http_client::{self, HttpClientConfig};
use crate::utils::query::UrlState;

pub fn build_client(cfg: &Settings) -> Result<Client> {
    http_client::get_client(Some(HttpClientConfig::from(cfg))).map_err(DashboardError::HttpClient)
}

/// State on startup: the view encoded in `initial_query` plus the viewer mode.
pub fn initial_state(cfg: &Settings) -> AppState {
    let url = cfg
        .initial_query
        .as_deref()
        .map(UrlState::parse)
        .unwrap_or_default();

    let mut state = AppState::from_query(url);
    state.ui.is_graph_viewer = cfg.is_graph_viewer;
    state
}

/// Spawns every background routine against `store`: the test-run poller, one
/// loop per tab, and the swarm-state poller when a Locust URL is configured.
pub fn start_monitoring(cfg: Arc<Settings>, store: Store) -> Result<Vec<JoinHandle<()>>> {
    let client = build_client(&cfg)?;
    let api = CloudStats::over_http(client.clone(), &cfg.api_base_url);
    info!("Using cloud-stats backend at {}", cfg.api_base_url);

    let mut routines = vec![
        tokio::spawn(TestrunPoller::new(api.clone(), store.clone(), cfg.testruns_poll_interval()).run()),
        tokio::spawn(run_tab(
            ChartsTab::new(api.clone(), Duration::from_millis(cfg.charts_interval_ms)),
            store.clone(),
        )),
        tokio::spawn(run_tab(
            StatsTab::new(api.clone(), Duration::from_millis(cfg.stats_interval_ms)),
            store.clone(),
        )),
        tokio::spawn(run_tab(
            ScatterplotTab::new(api.clone(), Duration::from_millis(cfg.scatterplot_interval_ms)),
            store.clone(),
        )),
        tokio::spawn(run_tab(TestrunsTab::new(api.clone()), store.clone())),
        tokio::spawn(run_tab(
            CustomerTab::new(
                api,
                CustomerDefaults {
                    max_users: cfg.max_users,
                    users_per_worker: cfg.users_per_worker,
                },
            ),
            store.clone(),
        )),
    ];

    match &cfg.locust_url {
        Some(locust_url) => routines.push(tokio::spawn(poll_swarm_state(
            client,
            locust_url.clone(),
            store,
            cfg.swarm_poll_interval(),
        ))),
        None => info!("No locust_url configured, swarm state is only updated through POST /swarm"),
    }

    info!("Started {} monitoring routines", routines.len());
    Ok(routines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_restores_query_and_viewer_mode() {
        let cfg = Settings {
            initial_query: Some("?testrun=11%2F30%2F2024%2C+10%3A09%3A10+AM&profile=myprofile".to_string()),
            is_graph_viewer: true,
            ..Settings::default()
        };

        let state = initial_state(&cfg);

        assert!(state.ui.is_graph_viewer);
        assert_eq!(state.toolbar.profile.as_deref(), Some("myprofile"));
        assert_eq!(state.url.testrun.as_deref(), Some("11/30/2024, 10:09:10 AM"));
    }

    #[test]
    fn invalid_default_header_fails_client_construction() {
        let mut cfg = Settings::default();
        cfg.http_default_headers.insert("bad header".to_string(), "x".to_string());

        assert!(matches!(build_client(&cfg), Err(DashboardError::HttpClient(_))));
    }
}
