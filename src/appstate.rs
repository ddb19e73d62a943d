use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::swarm::{SwarmSnapshot, SwarmState};
use crate::swarm_form::{evaluate, Alert, FormLimits};
use crate::tabs::charts::ChartsView;
use crate::tabs::scatterplot::ScatterplotView;
use crate::tabs::stats::StatsView;
use crate::tabs::testruns::TestrunsView;
use crate::utils::query::{QueryParam, UrlState};
use crate::utils::time::parse_timestamp;

pub const DEFAULT_RESOLUTION: u32 = 5;

/// A historical or in-progress test run. Identity is `run_id`; a run without
/// `end_time` is still in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Testrun {
    pub run_id: String,
    pub end_time: Option<String>,
    /// Position in the backend's run list.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locustfile: Option<String>,
}

/// Display string to run. Keys match `ToolbarState::testruns_for_display` one to one.
pub type TestrunMap = HashMap<String, Testrun>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolbarState {
    /// Seconds per time bucket.
    pub resolution: u32,
    pub current_testrun: Option<String>,
    pub current_testrun_index: Option<usize>,
    /// Newest display string seen when the swarm last stopped.
    pub previous_testrun: Option<String>,
    pub testruns: TestrunMap,
    pub testruns_for_display: Vec<String>,
    pub should_show_advanced: bool,
    pub profile: Option<String>,
    pub profiles: Vec<String>,
}

impl Default for ToolbarState {
    fn default() -> Self {
        ToolbarState {
            resolution: DEFAULT_RESOLUTION,
            current_testrun: None,
            current_testrun_index: Some(0),
            previous_testrun: None,
            testruns: TestrunMap::new(),
            testruns_for_display: Vec::new(),
            should_show_advanced: false,
            profile: None,
            profiles: Vec::new(),
        }
    }
}

impl ToolbarState {
    pub fn testrun_by_id(&self, run_id: &str) -> Option<&Testrun> {
        self.testruns.values().find(|testrun| testrun.run_id == run_id)
    }

    pub fn current(&self) -> Option<&Testrun> {
        self.current_testrun
            .as_deref()
            .and_then(|run_id| self.testrun_by_id(run_id))
    }

    /// Ordering key of a displayed run: its start time, or the display string
    /// itself when the run id does not parse.
    pub fn sort_key(&self, display: &str) -> (Option<i64>, String) {
        let timestamp = self
            .testruns
            .get(display)
            .and_then(|testrun| parse_timestamp(&testrun.run_id))
            .map(|timestamp| timestamp.timestamp_micros());
        (timestamp, display.to_string())
    }

    pub fn apply(&mut self, update: ToolbarUpdate) {
        if let Some(resolution) = update.resolution {
            self.resolution = resolution;
        }
        if let Some(current_testrun) = update.current_testrun {
            self.current_testrun = current_testrun;
        }
        if let Some(index) = update.current_testrun_index {
            self.current_testrun_index = index;
        }
        if let Some(previous_testrun) = update.previous_testrun {
            self.previous_testrun = Some(previous_testrun);
        }
        if let Some(testruns) = update.testruns {
            self.testruns = testruns;
        }
        if let Some(testruns_for_display) = update.testruns_for_display {
            self.testruns_for_display = testruns_for_display;
        }
        if let Some(show) = update.should_show_advanced {
            self.should_show_advanced = show;
        }
        if let Some(profile) = update.profile {
            self.profile = profile;
        }
        if let Some(profiles) = update.profiles {
            self.profiles = profiles;
        }
    }
}

/// Shallow merge into [`ToolbarState`]: only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolbarUpdate {
    pub resolution: Option<u32>,
    /// `Some(None)` clears the selection.
    pub current_testrun: Option<Option<String>>,
    pub current_testrun_index: Option<Option<usize>>,
    pub previous_testrun: Option<String>,
    pub testruns: Option<TestrunMap>,
    pub testruns_for_display: Option<Vec<String>>,
    pub should_show_advanced: Option<bool>,
    /// `Some(None)` clears the profile filter.
    pub profile: Option<Option<String>>,
    pub profiles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ViewType {
    #[default]
    Cloud,
    Classic,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub view_type: ViewType,
    pub has_dismissed_swarm_form: bool,
    pub is_graph_viewer: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerState {
    pub username: Option<String>,
    pub max_users: Option<u64>,
    pub max_vuh: Option<u64>,
    pub max_workers: Option<u64>,
    pub users_per_worker: Option<u64>,
    pub total_vuh: Option<String>,
    pub is_loaded: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerUpdate {
    pub username: Option<String>,
    pub max_users: Option<u64>,
    pub max_vuh: Option<u64>,
    pub max_workers: Option<u64>,
    pub users_per_worker: Option<u64>,
    pub total_vuh: Option<String>,
}

impl CustomerState {
    pub fn apply(&mut self, update: CustomerUpdate) {
        if update.username.is_some() {
            self.username = update.username;
        }
        if update.max_users.is_some() {
            self.max_users = update.max_users;
        }
        if update.max_vuh.is_some() {
            self.max_vuh = update.max_vuh;
        }
        if update.max_workers.is_some() {
            self.max_workers = update.max_workers;
        }
        if update.users_per_worker.is_some() {
            self.users_per_worker = update.users_per_worker;
        }
        if update.total_vuh.is_some() {
            self.total_vuh = update.total_vuh;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnackbarState {
    pub message: Option<String>,
}

/// What the swarm form reports to a renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmFormStatus {
    /// The form, and its Start control, is shown only while this is true.
    pub visible: bool,
    pub user_count: Option<u64>,
    pub alert: Option<Alert>,
    pub should_disable_form: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub toolbar: ToolbarState,
    pub ui: UiState,
    pub customer: CustomerState,
    pub snackbar: SnackbarState,
    pub swarm: SwarmSnapshot,
    pub url: UrlState,
    /// Last user count typed into the swarm form.
    pub swarm_form_user_count: Option<u64>,
    pub charts: ChartsView,
    pub stats: StatsView,
    pub scatterplot: ScatterplotView,
    pub testruns: TestrunsView,
}

impl AppState {
    /// Initial state restored from a query string: `profile` seeds the filter and
    /// `showAdvanced` the advanced toggle.
    pub fn from_query(url: UrlState) -> AppState {
        let mut state = AppState::default();
        state.toolbar.profile = url.profile.clone();
        state.toolbar.should_show_advanced = url.show_advanced.unwrap_or(false);
        state.url = url;
        state
    }

    pub fn push_query(&mut self, param: QueryParam) {
        self.url.push(param);
    }

    pub fn set_snackbar(&mut self, message: impl Into<String>) {
        self.snackbar.message = Some(message.into());
    }

    pub fn close_snackbar(&mut self) {
        self.snackbar.message = None;
    }

    /// Toolbar run selector. Returns false when `display` is not a known run.
    pub fn select_testrun(&mut self, display: &str) -> bool {
        let Some(testrun) = self.toolbar.testruns.get(display).cloned() else {
            return false;
        };

        self.charts.is_loading = true;
        self.charts.is_error = false;
        self.toolbar.apply(ToolbarUpdate {
            current_testrun: Some(Some(testrun.run_id)),
            current_testrun_index: Some(Some(testrun.index)),
            ..ToolbarUpdate::default()
        });
        self.push_query(QueryParam::Testrun(display.to_string()));
        true
    }

    pub fn set_resolution(&mut self, resolution: u32) {
        self.toolbar.apply(ToolbarUpdate {
            resolution: Some(resolution),
            ..ToolbarUpdate::default()
        });
    }

    /// An empty profile clears the filter.
    pub fn set_profile(&mut self, profile: Option<String>) {
        let profile = profile.filter(|profile| !profile.is_empty());
        self.toolbar.apply(ToolbarUpdate {
            profile: Some(profile.clone()),
            ..ToolbarUpdate::default()
        });
        self.push_query(QueryParam::Profile(profile.unwrap_or_default()));
    }

    pub fn set_show_advanced(&mut self, show: bool) {
        self.toolbar.apply(ToolbarUpdate {
            should_show_advanced: Some(show),
            ..ToolbarUpdate::default()
        });
        self.push_query(QueryParam::ShowAdvanced(show));
    }

    pub fn toggle_view_type(&mut self) -> ViewType {
        self.ui.view_type = match self.ui.view_type {
            ViewType::Cloud => ViewType::Classic,
            ViewType::Classic => ViewType::Cloud,
        };
        self.ui.view_type
    }

    pub fn dismiss_swarm_form(&mut self) {
        self.ui.has_dismissed_swarm_form = true;
    }

    pub fn form_limits(&self) -> FormLimits {
        FormLimits {
            num_users: self.swarm.num_users,
            worker_count: self.swarm.worker_count,
            max_users: self.customer.max_users,
            users_per_worker: self.customer.users_per_worker,
            max_vuh: self.customer.max_vuh,
            total_vuh: self.customer.total_vuh.clone(),
        }
    }

    pub fn swarm_form_status(&self) -> SwarmFormStatus {
        let gate = evaluate(&self.form_limits(), self.swarm_form_user_count);
        SwarmFormStatus {
            visible: !self.ui.is_graph_viewer
                && !self.ui.has_dismissed_swarm_form
                && self.swarm.state == SwarmState::Ready,
            user_count: self.swarm_form_user_count,
            alert: gate.alert,
            should_disable_form: gate.should_disable_form,
        }
    }
}

/// Shared application state. Writes are serialized by the mutex and bump a
/// revision that subscribers can wait on.
#[derive(Clone)]
pub struct Store {
    state: Arc<Mutex<AppState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Store {
    pub fn new(initial: AppState) -> Self {
        let (revision, _) = watch::channel(0);
        Store {
            state: Arc::new(Mutex::new(initial)),
            revision: Arc::new(revision),
        }
    }

    pub async fn snapshot(&self) -> AppState {
        self.state.lock().await.clone()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    /// Applies `f` and always bumps the revision.
    pub async fn update<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        self.update_if_changed(|state| (f(state), true)).await
    }

    /// Applies `f`, which reports whether it changed anything. Only a change
    /// bumps the revision, so loops that write while reacting to revisions
    /// do not wake themselves.
    pub async fn update_if_changed<R>(&self, f: impl FnOnce(&mut AppState) -> (R, bool)) -> R {
        let mut state = self.state.lock().await;
        let (result, changed) = f(&mut state);
        if changed {
            self.revision.send_modify(|revision| *revision += 1);
        }
        result
    }

    pub async fn set_toolbar(&self, update: ToolbarUpdate) {
        self.update_if_changed(|state| {
            let before = state.toolbar.clone();
            state.toolbar.apply(update);
            ((), state.toolbar != before)
        })
        .await
    }

    pub async fn set_snackbar(&self, message: impl Into<String>) {
        let message = message.into();
        self.update_if_changed(|state| {
            let changed = state.snackbar.message.as_deref() != Some(message.as_str());
            state.set_snackbar(message);
            ((), changed)
        })
        .await
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn testrun(run_id: &str, index: usize) -> Testrun {
        Testrun {
            run_id: run_id.to_string(),
            end_time: None,
            index,
            profile: None,
            locustfile: None,
        }
    }

    #[test]
    fn toolbar_update_merges_only_set_fields() {
        let mut toolbar = ToolbarState::default();
        toolbar.apply(ToolbarUpdate {
            profile: Some(Some("myprofile".to_string())),
            ..ToolbarUpdate::default()
        });
        toolbar.apply(ToolbarUpdate {
            resolution: Some(30),
            ..ToolbarUpdate::default()
        });

        assert_eq!(toolbar.resolution, 30);
        assert_eq!(toolbar.profile.as_deref(), Some("myprofile"));
        assert_eq!(toolbar.current_testrun_index, Some(0));

        toolbar.apply(ToolbarUpdate {
            profile: Some(None),
            ..ToolbarUpdate::default()
        });
        assert_eq!(toolbar.profile, None);
    }

    #[test]
    fn toolbar_update_can_clear_the_selected_run() {
        let mut toolbar = ToolbarState::default();
        toolbar.apply(ToolbarUpdate {
            current_testrun: Some(Some("2024-11-30T10:09:10".to_string())),
            current_testrun_index: Some(Some(0)),
            ..ToolbarUpdate::default()
        });

        toolbar.apply(ToolbarUpdate::default());
        assert_eq!(toolbar.current_testrun.as_deref(), Some("2024-11-30T10:09:10"));

        toolbar.apply(ToolbarUpdate {
            current_testrun: Some(None),
            current_testrun_index: Some(None),
            ..ToolbarUpdate::default()
        });
        assert_eq!(toolbar.current_testrun, None);
        assert_eq!(toolbar.current_testrun_index, None);
    }

    #[test]
    fn selecting_a_run_updates_toolbar_query_and_spinner() {
        let mut state = AppState::default();
        state.toolbar.testruns.insert("b".to_string(), testrun("2024-10-30T05:58:31", 1));
        state.charts.is_loading = false;
        state.charts.is_error = true;

        assert!(state.select_testrun("b"));
        assert_eq!(state.toolbar.current_testrun.as_deref(), Some("2024-10-30T05:58:31"));
        assert_eq!(state.toolbar.current_testrun_index, Some(1));
        assert_eq!(state.url.testrun.as_deref(), Some("b"));
        assert!(state.charts.is_loading);
        assert!(!state.charts.is_error);

        assert!(!state.select_testrun("unknown"));
    }

    #[test]
    fn query_seeds_profile_and_advanced_toggle() {
        let state = AppState::from_query(UrlState::parse("?profile=myprofile&showAdvanced=true"));

        assert_eq!(state.toolbar.profile.as_deref(), Some("myprofile"));
        assert!(state.toolbar.should_show_advanced);
    }

    #[test]
    fn dismissing_hides_the_swarm_form() {
        let mut state = AppState::default();
        assert!(state.swarm_form_status().visible);

        state.dismiss_swarm_form();

        assert!(state.ui.has_dismissed_swarm_form);
        assert!(!state.swarm_form_status().visible);
    }

    #[test]
    fn form_is_hidden_outside_ready_or_in_graph_viewer() {
        let mut state = AppState::default();
        state.swarm.state = SwarmState::Running;
        assert!(!state.swarm_form_status().visible);

        let mut state = AppState::default();
        state.ui.is_graph_viewer = true;
        assert!(!state.swarm_form_status().visible);
    }

    #[test]
    fn view_type_toggles() {
        let mut state = AppState::default();
        assert_eq!(state.toggle_view_type(), ViewType::Classic);
        assert_eq!(state.toggle_view_type(), ViewType::Cloud);
    }

    #[tokio::test]
    async fn store_bumps_revision_only_on_change() {
        let store = Store::new(AppState::default());
        let changes = store.subscribe();

        store.update_if_changed(|state| (state.toolbar.resolution, false)).await;
        assert_eq!(store.revision(), 0);

        store.set_snackbar("boom").await;
        assert_eq!(store.revision(), 1);
        assert!(changes.has_changed().unwrap());
        assert_eq!(store.read(|state| state.snackbar.message.clone()).await.as_deref(), Some("boom"));

        store.set_snackbar("boom").await;
        store
            .set_toolbar(ToolbarUpdate {
                resolution: Some(DEFAULT_RESOLUTION),
                ..ToolbarUpdate::default()
            })
            .await;
        assert_eq!(store.revision(), 1);

        store.update(|state| state.close_snackbar()).await;
        assert_eq!(store.revision(), 2);
    }
}
