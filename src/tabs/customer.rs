use std::time::Duration;

use crate::api::types::CustomerRow;
use crate::api::CloudStats;
use crate::appstate::{AppState, CustomerUpdate};
use crate::error::Result;
use crate::tabs::{report_first_error, Dependencies, TabFetcher};

/// Account limits used when `/customer` leaves them out.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CustomerDefaults {
    pub max_users: Option<u64>,
    pub users_per_worker: Option<u64>,
}

pub struct CustomerFetch {
    /// `None` once the account has been loaded.
    pub customer: Option<Result<Option<CustomerRow>>>,
    pub total_vuh: Result<Option<String>>,
}

/// Loads the account once and re-reads its virtual-user-hours on every swarm
/// state change, so the swarm form is gated on fresh usage.
pub struct CustomerTab {
    api: CloudStats,
    defaults: CustomerDefaults,
}

impl CustomerTab {
    pub fn new(api: CloudStats, defaults: CustomerDefaults) -> Self {
        CustomerTab { api, defaults }
    }
}

#[async_trait::async_trait]
impl TabFetcher for CustomerTab {
    type Outcome = CustomerFetch;

    fn name(&self) -> &'static str {
        "customer"
    }

    fn interval(&self) -> Option<Duration> {
        None
    }

    fn dependencies(&self, state: &AppState) -> Dependencies {
        vec![state.swarm.state.to_string()]
    }

    async fn fetch(&self, state: &AppState) -> Option<CustomerFetch> {
        let customer = async {
            if state.customer.is_loaded {
                None
            } else {
                Some(self.api.customer().await)
            }
        };

        let (customer, total_vuh) = futures::join!(customer, self.api.total_vuh());

        Some(CustomerFetch { customer, total_vuh })
    }

    fn merge(&self, state: &mut AppState, outcome: CustomerFetch) {
        report_first_error(
            self.name(),
            state,
            [
                outcome.customer.as_ref().and_then(|customer| customer.as_ref().err()),
                outcome.total_vuh.as_ref().err(),
            ],
        );

        // An account without a row stays unloaded and is asked for again.
        if let Some(Ok(Some(row))) = outcome.customer {
            state.customer.apply(CustomerUpdate {
                username: row.username,
                max_users: row.max_users,
                max_vuh: row.max_vuh,
                max_workers: row.max_workers,
                users_per_worker: row.users_per_worker,
                total_vuh: None,
            });
            state.customer.is_loaded = true;
        }

        if state.customer.max_users.is_none() {
            state.customer.max_users = self.defaults.max_users;
        }
        if state.customer.users_per_worker.is_none() {
            state.customer.users_per_worker = self.defaults.users_per_worker;
        }

        if let Ok(total_vuh) = outcome.total_vuh {
            state.customer.apply(CustomerUpdate {
                total_vuh,
                ..CustomerUpdate::default()
            });
        }
    }
}
