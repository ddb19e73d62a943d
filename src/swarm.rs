use std::fmt;
use std::time::Duration;

use log::{debug, error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::appstate::Store;
use crate::error::{DashboardError, Result};

/// Lifecycle of the load generator, owned by the external Locust process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmState {
    #[default]
    Ready,
    Spawning,
    Running,
    #[serde(alias = "stopping", alias = "cleanup", alias = "missing")]
    Stopped,
}

impl SwarmState {
    /// Tabs poll on their interval only while a test is producing data.
    pub fn is_active(&self) -> bool {
        matches!(self, SwarmState::Spawning | SwarmState::Running)
    }
}

impl fmt::Display for SwarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwarmState::Ready => "ready",
            SwarmState::Spawning => "spawning",
            SwarmState::Running => "running",
            SwarmState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmSnapshot {
    pub state: SwarmState,
    /// User count the swarm was started with.
    pub num_users: Option<u64>,
    pub worker_count: u64,
}

/// The subset of Locust's `/stats/requests` payload the dashboard needs.
#[derive(Debug, Deserialize)]
struct LocustStats {
    state: SwarmState,
    #[serde(default)]
    user_count: Option<u64>,
    #[serde(default)]
    workers: Option<Vec<serde_json::Value>>,
}

fn parse_locust_stats(url: &str, body: &str) -> Result<LocustStats> {
    serde_json::from_str(body).map_err(|source| DashboardError::Decode {
        path: url.to_string(),
        source,
    })
}

pub async fn fetch_swarm_state(client: &Client, locust_url: &str) -> Result<SwarmSnapshotUpdate> {
    let url = format!("{}/stats/requests", locust_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|source| DashboardError::Transport {
            path: url.clone(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DashboardError::Status {
            path: url,
            status: status.as_u16(),
        });
    }

    let text = response.text().await.map_err(|source| DashboardError::Transport {
        path: url.clone(),
        source,
    })?;
    let stats = parse_locust_stats(&url, &text)?;

    Ok(SwarmSnapshotUpdate {
        state: stats.state,
        num_users: stats.user_count,
        worker_count: stats.workers.map(|workers| workers.len() as u64),
    })
}

/// An externally reported swarm state, from Locust or `POST /swarm`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmSnapshotUpdate {
    pub state: SwarmState,
    #[serde(default)]
    pub num_users: Option<u64>,
    #[serde(default)]
    pub worker_count: Option<u64>,
}

impl SwarmSnapshot {
    /// Applies an external update. Returns the previous state when it changed.
    pub fn apply(&mut self, update: SwarmSnapshotUpdate) -> Option<SwarmState> {
        let previous = self.state;
        self.state = update.state;
        if update.num_users.is_some() {
            self.num_users = update.num_users;
        }
        if let Some(worker_count) = update.worker_count {
            self.worker_count = worker_count;
        }
        Some(previous).filter(|previous| *previous != update.state)
    }
}

/// Mirrors the external swarm state into the store on a fixed delay.
pub async fn poll_swarm_state(client: Client, locust_url: String, store: Store, interval: Duration) {
    info!("Polling swarm state from {}", locust_url);
    loop {
        match fetch_swarm_state(&client, &locust_url).await {
            Ok(update) => {
                let state = update.state;
                let previous = store
                    .update_if_changed(|app| {
                        let before = app.swarm.clone();
                        let previous = app.swarm.apply(update);
                        (previous, app.swarm != before)
                    })
                    .await;
                match previous {
                    Some(previous) => info!("Swarm state changed from '{}' to '{}'", previous, state),
                    None => debug!("Swarm state unchanged ('{}')", state),
                }
            }
            Err(e) => error!("{}", e),
        }
        tokio::time::sleep(interval).await;
    }
}
