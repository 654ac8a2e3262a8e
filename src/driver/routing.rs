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

pub(crate) mod handler;
pub(crate) mod registry;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::address_::Address;
use crate::driver::RoutingControl;

/// The cluster topology a rediscovery round reports: which servers currently
/// act as routers, readers, and writers, and for how long that answer may be
/// cached.
#[derive(Debug, Clone)]
pub struct ClusterComposition {
    pub routers: Vec<Arc<Address>>,
    pub readers: Vec<Arc<Address>>,
    pub writers: Vec<Arc<Address>>,
    pub expires_after: Duration,
}

/// The address directory for one database, with freshness metadata.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    database: Option<Arc<String>>,
    routers: Vec<Arc<Address>>,
    readers: Vec<Arc<Address>>,
    writers: Vec<Arc<Address>>,
    refreshed_at: Instant,
    expiry: Duration,
}

impl RoutingTable {
    /// A table that knows nothing but the initial router; it is stale for
    /// every mode, forcing a rediscovery before first use.
    pub(crate) fn new(database: Option<Arc<String>>, initial_routers: Vec<Arc<Address>>) -> Self {
        Self {
            database,
            routers: initial_routers,
            readers: Vec::new(),
            writers: Vec::new(),
            refreshed_at: Instant::now(),
            expiry: Duration::ZERO,
        }
    }

    #[inline]
    pub fn database(&self) -> Option<&Arc<String>> {
        self.database.as_ref()
    }

    #[inline]
    pub fn routers(&self) -> &[Arc<Address>] {
        &self.routers
    }

    #[inline]
    pub fn readers(&self) -> &[Arc<Address>] {
        &self.readers
    }

    #[inline]
    pub fn writers(&self) -> &[Arc<Address>] {
        &self.writers
    }

    pub(crate) fn servers_for_mode(&self, mode: RoutingControl) -> &[Arc<Address>] {
        match mode {
            RoutingControl::Read => &self.readers,
            RoutingControl::Write => &self.writers,
        }
    }

    /// A table is stale for a mode when it has no servers for that mode or
    /// its composition has outlived the expiry the routers attached to it.
    pub fn is_stale_for(&self, mode: RoutingControl) -> bool {
        if self.servers_for_mode(mode).is_empty() {
            debug!(
                "routing table expired: no servers for {:?} mode left {:?}",
                mode, self
            );
            return true;
        }
        if self.refreshed_at.elapsed() > self.expiry {
            debug!(
                "routing table expired: expiry ({:?}) < age ({:?}) {:?}",
                self.expiry,
                self.refreshed_at.elapsed(),
                self
            );
            return true;
        }
        false
    }

    /// Whether the table has been stale (expired and unrefreshed) for at
    /// least `purge_timeout`.
    pub(crate) fn is_stale(&self, purge_timeout: Duration) -> bool {
        self.refreshed_at.elapsed() >= self.expiry + purge_timeout
    }

    /// The union of routers, readers, and writers.
    pub fn servers(&self) -> HashSet<Arc<Address>> {
        [&self.routers, &self.readers, &self.writers]
            .into_iter()
            .flat_map(|addresses| addresses.iter().map(Arc::clone))
            .collect()
    }

    pub(crate) fn update(&mut self, composition: ClusterComposition) {
        self.routers = composition.routers;
        self.readers = composition.readers;
        self.writers = composition.writers;
        self.expiry = composition.expires_after;
        self.refreshed_at = Instant::now();
    }

    /// Remove `address` from readers, writers, and routers.
    pub(crate) fn forget(&mut self, address: &Address) {
        self.routers.retain(|a| **a != *address);
        self.readers.retain(|a| **a != *address);
        self.forget_writer(address);
    }

    /// Remove `address` from writers only.
    pub(crate) fn forget_writer(&mut self, address: &Address) {
        self.writers.retain(|a| **a != *address);
    }

    #[cfg(test)]
    pub(crate) fn age_by(&mut self, duration: Duration) {
        self.refreshed_at = self
            .refreshed_at
            .checked_sub(duration)
            .expect("test aged a routing table past the process start");
    }
}
