// Copyright ArborDB Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use itertools::Itertools;
use log::{debug, error, info};
use parking_lot::{Condvar, Mutex};

use super::registry::RoutingTableRegistry;
use super::RoutingTable;
use crate::address_::Address;
use crate::driver::spi::{ConnectionProvider, Rediscovery};
use crate::driver::RoutingControl;
use crate::error_::Result;

/// Keeps the routing table of one database fresh.
///
/// At most one rediscovery is in flight per handler at any instant;
/// concurrent refresh requests coalesce onto the in-flight one and all
/// observe the same outcome.
#[derive(Debug)]
pub(crate) struct RoutingTableHandler {
    database: Option<Arc<String>>,
    table: Mutex<RoutingTable>,
    registry: Weak<RoutingTableRegistry>,
    rediscovery: Arc<dyn Rediscovery>,
    provider: Arc<dyn ConnectionProvider>,
    in_flight: Mutex<Option<Arc<InFlightRefresh>>>,
    purge_timeout: Duration,
}

/// The cell concurrent refreshers rendezvous on: the winner publishes the
/// outcome, the losers block on the condvar until it's there.
#[derive(Debug, Default)]
struct InFlightRefresh {
    outcome: Mutex<Option<Result<()>>>,
    done: Condvar,
}

impl InFlightRefresh {
    fn wait(&self) -> Result<()> {
        let mut outcome = self.outcome.lock();
        while outcome.is_none() {
            self.done.wait(&mut outcome);
        }
        outcome.clone().expect("checked Some in loop above")
    }

    fn complete(&self, result: Result<()>) {
        *self.outcome.lock() = Some(result);
        self.done.notify_all();
    }
}

impl RoutingTableHandler {
    pub(crate) fn new(
        database: Option<Arc<String>>,
        initial_routers: Vec<Arc<Address>>,
        registry: Weak<RoutingTableRegistry>,
        rediscovery: Arc<dyn Rediscovery>,
        provider: Arc<dyn ConnectionProvider>,
        purge_timeout: Duration,
    ) -> Self {
        Self {
            table: Mutex::new(RoutingTable::new(database.clone(), initial_routers)),
            database,
            registry,
            rediscovery,
            provider,
            in_flight: Mutex::new(None),
            purge_timeout,
        }
    }

    /// Make sure the table is fresh for `mode`, refreshing it if necessary.
    ///
    /// A caller arriving while a refresh is already in flight waits for that
    /// refresh and shares its outcome.
    pub(crate) fn ensure_fresh(&self, mode: RoutingControl) -> Result<()> {
        let refresh = {
            let mut in_flight = self.in_flight.lock();
            if let Some(pending) = in_flight.as_ref() {
                // refresh is already happening concurrently, just use its result
                let pending = Arc::clone(pending);
                drop(in_flight);
                return pending.wait();
            }
            if !self.table.lock().is_stale_for(mode) {
                return Ok(());
            }
            let refresh = Arc::new(InFlightRefresh::default());
            *in_flight = Some(Arc::clone(&refresh));
            refresh
        };

        info!(
            "routing table for database {:?} is stale for {:?}, refreshing",
            self.database, mode
        );
        let result = self.refresh_routing_table();
        *self.in_flight.lock() = None;
        refresh.complete(result.clone());
        result
    }

    fn refresh_routing_table(&self) -> Result<()> {
        let result = self.lookup_and_apply();
        if let Err(lookup_error) = &result {
            error!(
                "failed to update routing table for database {:?}: {}",
                self.database, lookup_error
            );
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(&self.database);
            }
        }
        result
    }

    /// The rediscovery round trip; runs outside the in-flight monitor and
    /// without holding the table lock.
    fn lookup_and_apply(&self) -> Result<()> {
        let snapshot = self.table.lock().clone();
        let composition = self
            .rediscovery
            .lookup_cluster_composition(&snapshot, self.provider.as_ref())?;
        self.table.lock().update(composition);
        if let Some(registry) = self.registry.upgrade() {
            registry.purge_aged();
            self.provider.retain_all(&registry.all_servers())?;
        }
        debug!(
            "updated routing table for database {:?}: [{}]",
            self.database,
            self.servers().iter().join(", ")
        );
        Ok(())
    }

    /// Forget `address` entirely, preventing further connection attempts
    /// against it until the next rediscovery.
    pub(crate) fn on_connection_failure(&self, address: &Address) {
        self.table.lock().forget(address);
    }

    /// Stop treating `address` as a writer.
    pub(crate) fn on_write_failure(&self, address: &Address) {
        self.table.lock().forget_writer(address);
    }

    pub(crate) fn servers(&self) -> HashSet<Arc<Address>> {
        self.table.lock().servers()
    }

    /// Whether the registry may purge this handler: no refresh in flight and
    /// the table stale for at least the purge timeout.
    pub(crate) fn is_routing_table_stale(&self) -> bool {
        self.in_flight.lock().is_none() && self.table.lock().is_stale(self.purge_timeout)
    }

    #[cfg(test)]
    pub(crate) fn table_snapshot(&self) -> RoutingTable {
        self.table.lock().clone()
    }

    #[cfg(test)]
    pub(crate) fn age_table_by(&self, duration: Duration) {
        self.table.lock().age_by(duration);
    }
}
