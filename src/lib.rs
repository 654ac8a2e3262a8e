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

//! # ArborDB Driver
//!
//! This crate provides the client-side coordination core of a driver for the
//! ArborDB graph database: sessions, transactions, result cursors, retryable
//! units of work, and cluster routing tables.
//!
//! The wire protocol, the connection pool, and the embedded query engine are
//! deliberately kept behind small capability traits (see [`spi`]) so that the
//! coordination logic in this crate stays independent of any particular
//! transport or engine version.
//!
//! ## Concepts
//!
//! ### The Driver
//! The fundamental type of this crate is the [`Driver`].
//! Through it, all database interactions are performed.
//! A driver is created for one of three deployment shapes, dispatched on the
//! URI scheme (see [`DriverTarget`]):
//!  * `bolt://host:port` — a single server, no routing.
//!  * `bolt+routing://host:port` — a cluster; statements are routed to
//!    readers and writers via a per-database routing table.
//!  * `file:///path/to/store` — an embedded, in-process engine.
//!
//! ### Sessions
//! Sessions are spawned from the driver, see [`Driver::session()`].
//! Session creation is cheap, it's recommended to create a new session for
//! each piece of work.
//! A session is a *serial* scope: it permits at most one open transaction and
//! at most one outstanding result cursor at a time.
//!
//! There are two ways to run statements inside a session:
//!  * [`Session::begin_transaction()`] opens an explicit transaction that the
//!    caller commits or rolls back.
//!  * [`Session::run()`] executes a single statement in an auto-commit
//!    transaction managed by the server.
//!
//! For resilience, prefer [`Session::read_transaction()`] and
//! [`Session::write_transaction()`], which run a unit of work under the
//! driver's retry policy and transparently replay it on transient failures
//! (e.g., leader switches).
//!
//! ### Causal Consistency
//! ArborDB clusters are eventually consistent.
//! To chain transactions causally, the server hands the client an opaque
//! bookmark after every successful commit.
//! Sessions track these automatically: all work in one session forms a causal
//! chain.
//! To chain *across* sessions, pass [`Session::last_bookmark()`] into the
//! next session's [`SessionConfig::with_bookmarks()`].
//!
//! See also [`Bookmarks`].
//!
//! ## Logging
//! The driver uses the [`log`] crate for logging.
//!
//! **Important Notes on Usage:**
//!  * Log messages are *not* considered part of the driver's API.
//!    They may change at any time and don't follow semantic versioning.
//!  * The driver's logs are meant for debugging the driver itself.
//!    If there are problems the user-code needs to be aware of, they will be
//!    reported via [`Result`]s, not log messages.

mod address_;
pub mod driver;
mod error_;
mod macros;
mod sync;
pub mod value;

// imports for docs
#[allow(unused)]
use driver::session::bookmarks::Bookmarks;
#[allow(unused)]
use driver::session::{Session, SessionConfig};
#[allow(unused)]
use driver::{Driver, DriverTarget};

pub use error_::{ArborError, ErrorKind, NoSuchRecordError, Result};
pub use value::ValueReceive;
pub use value::ValueSend;

/// Server addresses.
pub mod address {
    pub use super::address_::*;
}
/// Bookmarks for causal consistency (see [crate docs](crate#causal-consistency)).
pub mod bookmarks {
    pub use super::driver::session::bookmarks::*;
}
/// Error and result types.
pub mod error {
    pub use super::error_::*;
}
/// Retry policies.
pub mod retry {
    pub use super::driver::session::retry::*;
}
/// Routing tables and cluster composition.
pub mod routing {
    pub use super::driver::routing::{ClusterComposition, RoutingTable};
}
/// Session, session configuration, and statements.
pub mod session {
    pub use super::driver::session::{Session, SessionConfig, Statement};
}
/// Capabilities consumed by the driver core (connections, protocol, engine).
pub mod spi {
    pub use super::driver::spi::*;
}
/// Query summary structs (metadata) received via
/// [`ResultCursor::consume()`](crate::driver::cursor::ResultCursor::consume).
pub mod summary {
    pub use super::driver::summary::*;
}
/// Transactions and associated types.
pub mod transaction {
    pub use super::driver::transaction::{Transaction, TransactionConfig, TransactionState};
}
