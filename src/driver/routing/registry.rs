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

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use super::handler::RoutingTableHandler;
use crate::address_::Address;
use crate::driver::spi::{ConnectionProvider, Rediscovery};
use crate::driver::RoutingControl;
use crate::error_::Result;
use crate::sync::MostlyRLock;

/// The driver-wide index of routing tables, keyed by database name.
///
/// Handlers are created lazily on first use of a database, removed
/// explicitly when their lookup fails, and purged once their table has been
/// stale for the purge timeout.
#[derive(Debug)]
pub(crate) struct RoutingTableRegistry {
    handlers: MostlyRLock<HashMap<Option<Arc<String>>, Arc<RoutingTableHandler>>>,
    provider: Arc<dyn ConnectionProvider>,
    rediscovery: Arc<dyn Rediscovery>,
    initial_router: Arc<Address>,
    purge_timeout: Duration,
}

impl RoutingTableRegistry {
    pub(crate) fn new(
        provider: Arc<dyn ConnectionProvider>,
        rediscovery: Arc<dyn Rediscovery>,
        initial_router: Arc<Address>,
        purge_timeout: Duration,
    ) -> Self {
        Self {
            handlers: MostlyRLock::new(HashMap::new()),
            provider,
            rediscovery,
            initial_router,
            purge_timeout,
        }
    }

    /// Get `database`'s table fresh for `mode`, creating the handler first
    /// if this is the database's first use.
    pub(crate) fn ensure_routing_table(
        self: &Arc<Self>,
        database: Option<Arc<String>>,
        mode: RoutingControl,
    ) -> Result<()> {
        let handler = self.handler_for(database)?;
        handler.ensure_fresh(mode)
    }

    pub(crate) fn handler_for(
        self: &Arc<Self>,
        database: Option<Arc<String>>,
    ) -> Result<Arc<RoutingTableHandler>> {
        let key = database.clone();
        let lock = self.handlers.maybe_write(
            |handlers| !handlers.contains_key(&key),
            |mut handlers| {
                handlers.entry(database.clone()).or_insert_with(|| {
                    debug!("creating routing table handler for database {:?}", database);
                    Arc::new(RoutingTableHandler::new(
                        database.clone(),
                        vec![Arc::clone(&self.initial_router)],
                        Arc::downgrade(self),
                        Arc::clone(&self.rediscovery),
                        Arc::clone(&self.provider),
                        self.purge_timeout,
                    ))
                });
                Ok(())
            },
        )?;
        Ok(Arc::clone(lock.get(&key).expect("inserted above")))
    }

    /// Best-effort snapshot of the union of all known server addresses.
    pub(crate) fn all_servers(&self) -> HashSet<Arc<Address>> {
        self.handlers
            .read()
            .values()
            .flat_map(|handler| handler.servers())
            .collect()
    }

    /// Drop `database`'s handler; the next caller will recreate it.
    pub(crate) fn remove(&self, database: &Option<Arc<String>>) {
        debug!("removing routing table handler for database {:?}", database);
        drop(self.handlers.update(|mut handlers| {
            handlers.remove(database);
            Ok(())
        }));
    }

    /// Remove every handler whose table has been stale for the purge
    /// timeout.
    pub(crate) fn purge_aged(&self) {
        drop(self.handlers.update(|mut handlers| {
            handlers.retain(|database, handler| {
                let stale = handler.is_routing_table_stale();
                if stale {
                    debug!("purging aged routing table for database {:?}", database);
                }
                !stale
            });
            Ok(())
        }));
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, database: &Option<Arc<String>>) -> bool {
        self.handlers.read().contains_key(database)
    }
}
