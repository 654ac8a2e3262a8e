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

//! Capabilities the driver core consumes.
//!
//! The coordination logic in this crate (sessions, transactions, cursors,
//! routing) is written against these traits.
//! Concrete implementations — the TCP/TLS connection pool, the wire protocol
//! versions, the rediscovery procedure, and the embedded engine — live
//! outside the core and are injected through [`Driver`](crate::driver::Driver)
//! construction.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::address_::Address;
use crate::driver::record::Record;
use crate::driver::routing::{ClusterComposition, RoutingTable};
use crate::driver::session::bookmarks::Bookmarks;
use crate::driver::session::Statement;
use crate::driver::transaction::TransactionConfig;
use crate::driver::RoutingControl;
use crate::error_::Result;
use crate::value::ValueReceive;

/// The terminal metadata a [`RecordSource`] yields once all records have been
/// emitted (summary fields, the commit bookmark, ...).
pub type SourceMeta = HashMap<String, ValueReceive>;

/// Hands out connections and manages their lifetime.
///
/// For routing drivers this is the pool *behind* the routing table: the core
/// keeps the table fresh and then acquires for the requested mode.
pub trait ConnectionProvider: Debug + Send + Sync {
    fn acquire(&self, mode: RoutingControl) -> Result<Box<dyn Connection>>;

    /// Close every pooled connection to a server that is not in `addresses`.
    ///
    /// Called after a routing table refresh with the union of all servers
    /// known to the routing table registry.
    fn retain_all(&self, addresses: &HashSet<Arc<Address>>) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// One live connection to a server.
///
/// Implementations must make [`release()`](Connection::release) idempotent
/// and report [`is_open()`](Connection::is_open) as `false` afterwards; the
/// session layer relies on both when it re-checks a previously used
/// connection.
pub trait Connection: Debug {
    /// The protocol negotiated for this connection.
    fn protocol(&self) -> Arc<dyn Protocol>;

    fn is_open(&self) -> bool;

    /// Send a protocol reset, aborting whatever is in flight server-side.
    fn reset(&mut self) -> Result<()>;

    /// Return the connection to its pool.
    fn release(&mut self) -> Result<()>;

    /// Best-effort kill: close the socket and return the slot to the pool,
    /// ignoring any errors on the way.
    fn terminate_and_release(&mut self, reason: &str);
}

/// The message-level operations of one negotiated protocol version.
pub trait Protocol: Debug {
    /// Start an explicit transaction on `connection`.
    fn begin_transaction(
        &self,
        connection: &mut dyn Connection,
        bookmarks: &Bookmarks,
        config: &TransactionConfig,
    ) -> Result<()>;

    /// Run `statement` in a server-managed auto-commit transaction.
    ///
    /// The commit bookmark is delivered through the returned source's
    /// terminal metadata under the key `"bookmark"`.
    ///
    /// `wait_for_run_response` requests that the statement's acknowledgement
    /// is awaited before this call returns, so that statement errors surface
    /// here rather than on first record fetch.
    fn run_in_auto_commit_transaction(
        &self,
        connection: &mut dyn Connection,
        statement: &Statement,
        bookmarks: &Bookmarks,
        config: &TransactionConfig,
        wait_for_run_response: bool,
    ) -> Result<Box<dyn RecordSource>>;

    /// Run `statement` inside the explicit transaction open on `connection`.
    fn run_in_explicit_transaction(
        &self,
        connection: &mut dyn Connection,
        statement: &Statement,
        wait_for_run_response: bool,
    ) -> Result<Box<dyn RecordSource>>;

    /// Commit the explicit transaction open on `connection`, returning the
    /// bookmarks that establish the commit in the causal order.
    fn commit_transaction(&self, connection: &mut dyn Connection) -> Result<Bookmarks>;

    /// Roll back the explicit transaction open on `connection`.
    fn rollback_transaction(&self, connection: &mut dyn Connection) -> Result<()>;
}

/// A stream of records produced by one running statement.
///
/// This is the seam between the cursor (driver core) and wherever records
/// actually come from: a network protocol puller or an iterator over an
/// embedded engine result.
pub trait RecordSource: Debug {
    /// The ordered column names of the result.
    fn keys(&self) -> Vec<Arc<String>>;

    /// The next record, or `None` once the stream is complete.
    ///
    /// An error is terminal; implementations will not be polled again after
    /// returning one.
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Discard any remaining records and return the terminal metadata.
    fn finish(&mut self) -> Result<SourceMeta>;
}

/// An in-process query engine backing the embedded driver variant.
pub trait CypherRunner: Debug + Send + Sync {
    /// Execute `statement` inside the engine's current transaction scope.
    fn execute(&self, statement: &Statement) -> Result<Box<dyn RecordSource>>;

    /// Open an engine transaction; `timeout` is forwarded from
    /// [`TransactionConfig::timeout()`].
    fn begin_transaction(&self, timeout: Option<Duration>) -> Result<Box<dyn EngineTransaction>>;
}

/// A handle on one open engine transaction.
pub trait EngineTransaction: Debug {
    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}

/// Fetches a fresh cluster composition by asking routers.
///
/// Implementations consult the routers of `table` one by one, falling back
/// until one answers or all fail; only total failure surfaces as an error.
pub trait Rediscovery: Debug + Send + Sync {
    fn lookup_cluster_composition(
        &self,
        table: &RoutingTable,
        provider: &dyn ConnectionProvider,
    ) -> Result<ClusterComposition>;
}
