//! Per-tab data fetchers and the loop that drives them.
//!
//! Each tab fetches when one of its dependencies changes and, while the swarm
//! is active, again on a fixed delay after the previous fetch finished. Every
//! fetch takes a ticket from the tab's [`RequestSequence`]; a response is only
//! merged if no newer fetch was issued in the meantime and the tab's
//! dependencies still match the ones it was issued for.

pub mod charts;
pub mod customer;
pub mod scatterplot;
pub mod stats;
pub mod testruns;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::appstate::{AppState, Store};
use crate::error::DashboardError;
use crate::swarm::SwarmState;

/// Values whose change triggers a refetch, rendered to strings for comparison.
pub type Dependencies = Vec<String>;

#[async_trait::async_trait]
pub trait TabFetcher: Send + Sync + 'static {
    type Outcome: Send + 'static;

    fn name(&self) -> &'static str;

    /// Fixed delay between interval fetches; `None` fetches on dependency changes only.
    fn interval(&self) -> Option<Duration>;

    fn dependencies(&self, state: &AppState) -> Dependencies;

    fn should_run_interval(&self, state: &AppState) -> bool {
        state.swarm.state.is_active()
    }

    /// Called once per observed swarm-state transition, before any fetch it triggers.
    fn on_swarm_change(&self, _state: &mut AppState, _previous: SwarmState) {}

    /// Issues the tab's requests against a snapshot of the state. `None` means
    /// the tab has nothing to fetch yet.
    async fn fetch(&self, state: &AppState) -> Option<Self::Outcome>;

    fn merge(&self, state: &mut AppState, outcome: Self::Outcome);
}

/// Monotonic request counter; only the latest ticket may merge.
#[derive(Debug, Default)]
pub struct RequestSequence {
    latest: AtomicU64,
}

impl RequestSequence {
    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_latest(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }
}

/// The snackbar shows one error per tick: the first one found.
pub fn first_error<'a>(
    errors: impl IntoIterator<Item = Option<&'a DashboardError>>,
) -> Option<&'a DashboardError> {
    errors.into_iter().flatten().next()
}

pub(crate) fn report_first_error<'a>(
    tab: &str,
    state: &mut AppState,
    errors: impl IntoIterator<Item = Option<&'a DashboardError>>,
) {
    if let Some(error) = first_error(errors) {
        log::error!("'{}' tab: {}", tab, error);
        state.set_snackbar(error.to_string());
    }
}

fn spawn_fetch<F: TabFetcher>(
    fetcher: Arc<F>,
    store: Store,
    sequence: Arc<RequestSequence>,
    state: AppState,
    issued: Dependencies,
) -> JoinHandle<()> {
    let ticket = sequence.issue();
    tokio::spawn(async move {
        debug!("'{}' tab: fetching (request {})", fetcher.name(), ticket);
        let Some(outcome) = fetcher.fetch(&state).await else {
            return;
        };

        store
            .update_if_changed(|state| {
                if !sequence.is_latest(ticket) {
                    debug!("'{}' tab: discarding stale request {}", fetcher.name(), ticket);
                    return ((), false);
                }
                if fetcher.dependencies(state) != issued {
                    debug!("'{}' tab: dependencies moved, discarding request {}", fetcher.name(), ticket);
                    return ((), false);
                }
                fetcher.merge(state, outcome);
                debug!("'{}' tab: merged request {}", fetcher.name(), ticket);
                ((), true)
            })
            .await;
    })
}

async fn join_in_flight(handle: &mut Option<JoinHandle<()>>) {
    match handle.as_mut() {
        Some(handle) => {
            if let Err(e) = handle.await {
                log::error!("Fetch task failed: {}", e);
            }
        }
        None => futures::future::pending::<()>().await,
    }
}

/// Drives one tab until the store is dropped.
pub async fn run_tab<F: TabFetcher>(fetcher: F, store: Store) {
    let fetcher = Arc::new(fetcher);
    let sequence = Arc::new(RequestSequence::default());
    let mut changes = store.subscribe();
    let mut last_dependencies: Option<Dependencies> = None;
    let mut last_swarm_state: Option<SwarmState> = None;
    let mut in_flight: Option<JoinHandle<()>> = None;
    let mut next_tick = Instant::now();

    info!("Starting '{}' tab", fetcher.name());

    loop {
        changes.borrow_and_update();

        let current_swarm_state = store.read(|state| state.swarm.state).await;
        if let Some(previous) = last_swarm_state.filter(|previous| *previous != current_swarm_state) {
            store
                .update(|state| fetcher.on_swarm_change(state, previous))
                .await;
        }
        last_swarm_state = Some(current_swarm_state);

        let (dependencies_changed, run_interval) = store
            .read(|state| {
                (
                    last_dependencies.as_ref() != Some(&fetcher.dependencies(state)),
                    fetcher.should_run_interval(state),
                )
            })
            .await;
        let interval = fetcher.interval().filter(|_| run_interval);
        let idle = in_flight.is_none();
        let due = interval.is_some() && idle && Instant::now() >= next_tick;

        if dependencies_changed || due {
            // The snapshot is only taken when a fetch actually goes out.
            let state = store.snapshot().await;
            let issued = fetcher.dependencies(&state);
            last_dependencies = Some(issued.clone());
            in_flight = Some(spawn_fetch(fetcher.clone(), store.clone(), sequence.clone(), state, issued));
        }

        let idle = in_flight.is_none();
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = join_in_flight(&mut in_flight), if !idle => {
                in_flight = None;
                next_tick = Instant::now() + interval.unwrap_or_default();
            }
            _ = tokio::time::sleep_until(next_tick), if idle && interval.is_some() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use tokio::sync::Notify;

    use super::*;

    /// Counts its fetches, remembers the snackbar each one saw and, when
    /// gated, holds every fetch until the gate is opened.
    #[derive(Default)]
    struct CountingTab {
        calls: AtomicUsize,
        seen_snackbars: Mutex<Vec<Option<String>>>,
        gate: Option<Notify>,
    }

    impl CountingTab {
        fn gated() -> Self {
            CountingTab {
                gate: Some(Notify::new()),
                ..CountingTab::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl TabFetcher for Arc<CountingTab> {
        type Outcome = usize;

        fn name(&self) -> &'static str {
            "counting"
        }

        fn interval(&self) -> Option<Duration> {
            Some(Duration::from_secs(1))
        }

        fn dependencies(&self, state: &AppState) -> Dependencies {
            vec![
                state.toolbar.current_testrun.clone().unwrap_or_default(),
                state.toolbar.resolution.to_string(),
                state.swarm.state.to_string(),
            ]
        }

        fn on_swarm_change(&self, state: &mut AppState, previous: SwarmState) {
            state.set_snackbar(format!("swarm was {}", previous));
        }

        async fn fetch(&self, state: &AppState) -> Option<usize> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen_snackbars.lock().unwrap().push(state.snackbar.message.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Some(n)
        }

        fn merge(&self, state: &mut AppState, outcome: usize) {
            state.stats.total_requests = Some(outcome as f64);
        }
    }

    fn state_on(run_id: &str, swarm_state: SwarmState) -> AppState {
        let mut state = AppState::default();
        state.toolbar.current_testrun = Some(run_id.to_string());
        state.swarm.state = swarm_state;
        state
    }

    async fn total(store: &Store) -> Option<f64> {
        store.read(|state| state.stats.total_requests).await
    }

    #[tokio::test]
    async fn merges_when_dependencies_are_unchanged() {
        let tab = Arc::new(CountingTab::default());
        let store = Store::new(state_on("A", SwarmState::Stopped));
        let state = store.snapshot().await;
        let issued = tab.dependencies(&state);

        spawn_fetch(Arc::new(tab.clone()), store.clone(), Arc::default(), state, issued)
            .await
            .unwrap();

        assert_eq!(total(&store).await, Some(1.0));
    }

    #[tokio::test]
    async fn response_for_a_previous_run_is_discarded() {
        let tab = Arc::new(CountingTab::gated());
        let store = Store::new(state_on("A", SwarmState::Stopped));
        let state = store.snapshot().await;
        let issued = tab.dependencies(&state);

        let handle = spawn_fetch(Arc::new(tab.clone()), store.clone(), Arc::default(), state, issued);
        store
            .update(|state| state.toolbar.current_testrun = Some("B".to_string()))
            .await;
        let revision = store.revision();
        if let Some(gate) = &tab.gate {
            gate.notify_one();
        }
        handle.await.unwrap();

        assert_eq!(tab.calls(), 1);
        assert_eq!(total(&store).await, None);
        assert_eq!(store.revision(), revision);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_swarm_fetches_only_on_dependency_changes() {
        let tab = Arc::new(CountingTab::default());
        let store = Store::new(state_on("A", SwarmState::Stopped));
        tokio::spawn(run_tab(tab.clone(), store.clone()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(tab.calls(), 1);
        assert_eq!(total(&store).await, Some(1.0));

        store.update(|state| state.set_resolution(30)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(tab.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn running_swarm_fetches_once_per_interval() {
        let tab = Arc::new(CountingTab::default());
        let store = Store::new(state_on("A", SwarmState::Running));
        tokio::spawn(run_tab(tab.clone(), store.clone()));

        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(tab.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn swarm_change_is_applied_before_the_fetch_it_triggers() {
        let tab = Arc::new(CountingTab::default());
        let store = Store::new(state_on("A", SwarmState::Stopped));
        tokio::spawn(run_tab(tab.clone(), store.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        store.update(|state| state.swarm.state = SwarmState::Running).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let seen = tab.seen_snackbars.lock().unwrap().clone();
        assert_eq!(seen, vec![None, Some("swarm was stopped".to_string())]);
    }

    #[test]
    fn only_the_latest_ticket_is_current() {
        let sequence = RequestSequence::default();
        let first = sequence.issue();
        assert!(sequence.is_latest(first));

        let second = sequence.issue();
        assert!(!sequence.is_latest(first));
        assert!(sequence.is_latest(second));
    }

    #[test]
    fn first_error_wins() {
        let a = DashboardError::Status { path: "/a".to_string(), status: 500 };
        let b = DashboardError::HttpClient("no proxy".to_string());

        let found = first_error([None, Some(&a), Some(&b)]).unwrap();
        assert!(matches!(found, DashboardError::Status { status: 500, .. }));
        assert!(first_error([None, None]).is_none());
    }
}
