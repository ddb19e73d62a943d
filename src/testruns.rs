//! Test-run poller: keeps the toolbar's run list and current run in step with the backend.

use std::time::Duration;

use log::{debug, error, info};

use crate::api::types::TestrunResponse;
use crate::api::CloudStats;
use crate::appstate::{AppState, Store, Testrun, TestrunMap, ToolbarState, ToolbarUpdate};
use crate::swarm::SwarmState;
use crate::utils::query::QueryParam;
use crate::utils::time::display_timestamp;

/// Whether the poller should fetch on this tick.
///
/// Runs are loaded while none are known yet and something beyond the bare swarm
/// form is on screen, and again while a new test is running but its run has not
/// shown up since the last stop.
pub fn should_poll(toolbar: &ToolbarState, swarm_state: SwarmState, bootstrap: bool) -> bool {
    let nothing_loaded = toolbar.testruns_for_display.is_empty()
        && (swarm_state != SwarmState::Ready || bootstrap);

    let waiting_for_new_run = match (&toolbar.previous_testrun, toolbar.testruns_for_display.first()) {
        (Some(previous), Some(newest)) => {
            swarm_state == SwarmState::Running && toolbar.sort_key(newest) <= toolbar.sort_key(previous)
        }
        (Some(_), None) => swarm_state == SwarmState::Running,
        _ => false,
    };

    nothing_loaded || waiting_for_new_run
}

/// A run belongs to `profile` when either its profile tag or its locustfile matches.
pub fn matches_profile(testrun: &TestrunResponse, profile: &str) -> bool {
    testrun.profile.as_deref() == Some(profile) || testrun.locustfile.as_deref() == Some(profile)
}

/// Result of one successful fetch: the toolbar merge plus the run to push into
/// the query string, if the choice was forced.
#[derive(Debug, Clone, PartialEq)]
pub struct TestrunSelection {
    pub update: ToolbarUpdate,
    pub pushed_testrun: Option<String>,
}

/// Builds the run map and display list from the backend's run list and picks the
/// current run. Returns `None` for an empty list, which leaves the toolbar as is.
pub fn select_testruns(
    runs: &[TestrunResponse],
    swarm_state: SwarmState,
    profile: Option<&str>,
    url_testrun: Option<&str>,
) -> Option<TestrunSelection> {
    if runs.is_empty() {
        return None;
    }

    let for_profile: Vec<Testrun> = runs
        .iter()
        .enumerate()
        .filter(|(_, run)| profile.map_or(true, |profile| matches_profile(run, profile)))
        .map(|(index, run)| Testrun {
            run_id: run.run_id.clone(),
            end_time: run.end_time.clone(),
            index,
            profile: run.profile.clone(),
            locustfile: run.locustfile.clone(),
        })
        .collect();

    let testruns_for_display: Vec<String> = for_profile
        .iter()
        .map(|testrun| display_timestamp(&testrun.run_id))
        .collect();

    let testruns: TestrunMap = testruns_for_display
        .iter()
        .cloned()
        .zip(for_profile.iter().cloned())
        .collect();

    let force_newest = swarm_state == SwarmState::Running || profile.is_some();
    let chosen = if force_newest {
        testruns_for_display.first()
    } else {
        url_testrun
            .filter(|display| testruns.contains_key(*display))
            .and_then(|display| testruns_for_display.iter().find(|d| d.as_str() == display))
            .or_else(|| testruns_for_display.first())
    };

    let current = chosen.and_then(|display| testruns.get(display).map(|run| (display.clone(), run.clone())));
    let pushed_testrun = match (&current, profile) {
        (Some((display, _)), Some(_)) => Some(display.clone()),
        _ => None,
    };

    // A filter that matches nothing clears the selection.
    let update = ToolbarUpdate {
        current_testrun: Some(current.as_ref().map(|(_, run)| run.run_id.clone())),
        current_testrun_index: Some(current.as_ref().map(|(_, run)| run.index)),
        testruns: Some(testruns),
        testruns_for_display: Some(testruns_for_display),
        ..ToolbarUpdate::default()
    };

    Some(TestrunSelection { update, pushed_testrun })
}

/// When the swarm is stopped, the newest displayed run becomes the "previous"
/// run: no further runs are expected until a new one appears.
pub fn previous_testrun_on_stop(toolbar: &ToolbarState, swarm_state: SwarmState) -> Option<String> {
    if swarm_state != SwarmState::Stopped {
        return None;
    }

    toolbar
        .testruns_for_display
        .first()
        .filter(|newest| toolbar.previous_testrun.as_ref() != Some(*newest))
        .cloned()
}

fn apply_selection(state: &mut AppState, selection: TestrunSelection) {
    let before = state.toolbar.current_testrun.clone();
    state.toolbar.apply(selection.update);

    if let Some(display) = selection.pushed_testrun {
        state.push_query(QueryParam::Testrun(display));
    }

    if state.toolbar.current_testrun != before {
        info!(
            "Current test run is now {:?} (index {:?})",
            state.toolbar.current_testrun, state.toolbar.current_testrun_index
        );
    }
}

pub struct TestrunPoller {
    api: CloudStats,
    store: Store,
    interval: Duration,
}

impl TestrunPoller {
    pub fn new(api: CloudStats, store: Store, interval: Duration) -> Self {
        TestrunPoller { api, store, interval }
    }

    /// One fetch of the run list, merged into the toolbar. Errors go to the snackbar.
    pub async fn tick(&self) -> bool {
        debug!("Fetching test runs");
        match self.api.testruns().await {
            Ok(runs) => {
                self.store
                    .update_if_changed(|state| {
                        let selection = select_testruns(
                            &runs,
                            state.swarm.state,
                            state.toolbar.profile.as_deref(),
                            state.url.testrun.as_deref(),
                        );
                        match selection {
                            Some(selection) => {
                                let before = (state.toolbar.clone(), state.url.clone());
                                apply_selection(state, selection);
                                let changed = (&state.toolbar, &state.url) != (&before.0, &before.1);
                                (true, changed)
                            }
                            None => (false, false),
                        }
                    })
                    .await
            }
            Err(e) => {
                error!("{}", e);
                self.store.set_snackbar(e.to_string()).await;
                false
            }
        }
    }

    pub async fn load_profiles(&self) {
        match self.api.profiles().await {
            Ok(profiles) => {
                self.store
                    .set_toolbar(ToolbarUpdate {
                        profiles: Some(profiles),
                        ..ToolbarUpdate::default()
                    })
                    .await
            }
            Err(e) => {
                error!("{}", e);
                self.store.set_snackbar(e.to_string()).await;
            }
        }
    }

    /// Polls on a fixed delay while [`should_poll`] holds and otherwise sleeps
    /// until the store changes. A profile change re-filters immediately.
    pub async fn run(self) {
        let mut changes = self.store.subscribe();
        let mut last_profile = None;

        self.load_profiles().await;

        loop {
            changes.borrow_and_update();

            let (poll, profile) = self
                .store
                .update_if_changed(|state| {
                    let previous = previous_testrun_on_stop(&state.toolbar, state.swarm.state);
                    let marked = previous.is_some();
                    if let Some(previous) = previous {
                        debug!("Swarm stopped, marking '{}' as the previous test run", previous);
                        state.toolbar.previous_testrun = Some(previous);
                    }
                    let bootstrap = state.ui.is_graph_viewer || state.ui.has_dismissed_swarm_form;
                    (
                        (
                            should_poll(&state.toolbar, state.swarm.state, bootstrap),
                            state.toolbar.profile.clone(),
                        ),
                        marked,
                    )
                })
                .await;

            let profile_changed = last_profile.as_ref() != Some(&profile);
            let refilter = profile_changed && last_profile.is_some();
            last_profile = Some(profile);

            if poll || refilter {
                self.tick().await;
                if poll {
                    tokio::time::sleep(self.interval).await;
                }
                continue;
            }

            if changes.changed().await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::fake_api;
    use crate::api::Endpoint;
    use serde_json::json;

    const RUN_IDS: [&str; 3] = [
        "2024-11-30 10:09:10.771147+00:00",
        "2024-10-30 05:58:31.234505+00:00",
        "2024-10-30 06:00:44.325405+00:00",
    ];

    fn response() -> serde_json::Value {
        json!([
            { "runId": RUN_IDS[0], "endTime": "2024-11-30 11:00:37.653931+00:00", "locustfile": "locustfile.py", "profile": null },
            { "runId": RUN_IDS[1], "endTime": "2024-10-30 08:39:22.358997+00:00", "locustfile": "locustfile.py", "profile": null },
            { "runId": RUN_IDS[2], "endTime": "2024-10-30 08:39:22.358997+00:00", "locustfile": "different_locustfile.py", "profile": "myprofile" },
        ])
    }

    fn runs() -> Vec<TestrunResponse> {
        serde_json::from_value(response()).unwrap()
    }

    fn displays() -> Vec<String> {
        RUN_IDS.iter().map(|run_id| display_timestamp(run_id)).collect()
    }

    fn loaded_toolbar() -> ToolbarState {
        let mut toolbar = ToolbarState::default();
        toolbar.apply(select_testruns(&runs(), SwarmState::Stopped, None, None).unwrap().update);
        toolbar
    }

    #[test]
    fn builds_map_and_display_list_in_backend_order() {
        let selection = select_testruns(&runs(), SwarmState::Running, None, None).unwrap();
        let update = selection.update;

        assert_eq!(update.testruns_for_display.as_ref().unwrap(), &displays());
        let testruns = update.testruns.unwrap();
        for (index, display) in displays().iter().enumerate() {
            assert_eq!(testruns[display].index, index);
            assert_eq!(testruns[display].run_id, RUN_IDS[index]);
        }
        assert_eq!(update.current_testrun, Some(Some(RUN_IDS[0].to_string())));
        assert_eq!(update.current_testrun_index, Some(Some(0)));
        assert_eq!(selection.pushed_testrun, None);
    }

    #[test]
    fn filters_by_locustfile() {
        let selection = select_testruns(&runs(), SwarmState::Running, Some("locustfile.py"), None).unwrap();

        assert_eq!(selection.update.testruns_for_display.unwrap().len(), 2);
    }

    #[test]
    fn filters_by_profile_and_keeps_original_index() {
        let selection = select_testruns(&runs(), SwarmState::Stopped, Some("myprofile"), None).unwrap();

        assert_eq!(selection.update.testruns_for_display.as_ref().unwrap().len(), 1);
        assert_eq!(selection.update.current_testrun_index, Some(Some(2)));
        assert_eq!(selection.update.current_testrun, Some(Some(RUN_IDS[2].to_string())));
        assert_eq!(selection.pushed_testrun, Some(displays()[2].clone()));
    }

    #[test]
    fn url_selects_run_when_not_forced() {
        let url = displays()[1].clone();

        let selection = select_testruns(&runs(), SwarmState::Stopped, None, Some(&url)).unwrap();
        assert_eq!(selection.update.current_testrun_index, Some(Some(1)));
        assert_eq!(selection.update.current_testrun, Some(Some(RUN_IDS[1].to_string())));

        let running = select_testruns(&runs(), SwarmState::Running, None, Some(&url)).unwrap();
        assert_eq!(running.update.current_testrun_index, Some(Some(0)));

        let unknown = select_testruns(&runs(), SwarmState::Stopped, None, Some("nope")).unwrap();
        assert_eq!(unknown.update.current_testrun_index, Some(Some(0)));
    }

    #[test]
    fn profile_without_runs_clears_the_selection() {
        let mut toolbar = loaded_toolbar();
        assert_eq!(toolbar.current_testrun.as_deref(), Some(RUN_IDS[0]));

        let selection = select_testruns(&runs(), SwarmState::Stopped, Some("nomatch"), None).unwrap();
        assert_eq!(selection.pushed_testrun, None);
        toolbar.apply(selection.update);

        assert!(toolbar.testruns_for_display.is_empty());
        assert!(toolbar.testruns.is_empty());
        assert_eq!(toolbar.current_testrun, None);
        assert_eq!(toolbar.current_testrun_index, None);
        assert!(toolbar.current().is_none());
    }

    #[test]
    fn empty_list_changes_nothing() {
        assert_eq!(select_testruns(&[], SwarmState::Running, None, None), None);
    }

    #[test]
    fn polls_until_runs_are_loaded() {
        let empty = ToolbarState::default();

        assert!(!should_poll(&empty, SwarmState::Ready, false));
        assert!(should_poll(&empty, SwarmState::Ready, true));
        assert!(should_poll(&empty, SwarmState::Spawning, false));
        assert!(!should_poll(&loaded_toolbar(), SwarmState::Running, false));
    }

    #[test]
    fn polls_while_waiting_for_a_new_run() {
        let mut toolbar = loaded_toolbar();
        toolbar.previous_testrun = Some(displays()[0].clone());

        assert!(should_poll(&toolbar, SwarmState::Running, false));
        assert!(!should_poll(&toolbar, SwarmState::Stopped, false));

        let newer = "2024-12-01T08:00:00";
        let mut newer_runs = runs();
        newer_runs.insert(
            0,
            TestrunResponse {
                run_id: newer.to_string(),
                end_time: None,
                profile: None,
                locustfile: None,
            },
        );
        toolbar.apply(select_testruns(&newer_runs, SwarmState::Running, None, None).unwrap().update);

        assert!(!should_poll(&toolbar, SwarmState::Running, false));
    }

    #[test]
    fn stop_marks_the_newest_run_as_previous() {
        let toolbar = loaded_toolbar();

        assert_eq!(previous_testrun_on_stop(&toolbar, SwarmState::Running), None);
        assert_eq!(previous_testrun_on_stop(&toolbar, SwarmState::Stopped), Some(displays()[0].clone()));

        let mut marked = toolbar.clone();
        marked.previous_testrun = Some(displays()[0].clone());
        assert_eq!(previous_testrun_on_stop(&marked, SwarmState::Stopped), None);
    }

    #[tokio::test]
    async fn tick_updates_the_store() {
        let (transport, api) = fake_api();
        transport.respond(Endpoint::Testruns, response());
        let mut initial = AppState::default();
        initial.swarm.state = SwarmState::Running;
        let store = Store::new(initial);

        let poller = TestrunPoller::new(api, store.clone(), Duration::from_millis(500));
        assert!(poller.tick().await);

        let toolbar = store.read(|state| state.toolbar.clone()).await;
        assert_eq!(toolbar.testruns_for_display, displays());
        assert_eq!(toolbar.current_testrun_index, Some(0));
        assert_eq!(toolbar.current_testrun.as_deref(), Some(RUN_IDS[0]));

        let revision = store.revision();
        assert!(poller.tick().await);
        assert_eq!(store.revision(), revision);
    }

    #[tokio::test]
    async fn tick_errors_reach_the_snackbar() {
        let (transport, api) = fake_api();
        transport.fail(Endpoint::Testruns, 500);
        let store = Store::new(AppState::default());

        let poller = TestrunPoller::new(api, store.clone(), Duration::from_millis(500));
        assert!(!poller.tick().await);

        let message = store.read(|state| state.snackbar.message.clone()).await.unwrap();
        assert!(message.contains("500"));
    }
}
