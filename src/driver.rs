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

pub(crate) mod config;
pub mod cursor;
pub(crate) mod record;
pub(crate) mod routing;
pub(crate) mod session;
pub mod spi;
pub(crate) mod summary;
#[cfg(test)]
pub(crate) mod testing;
pub mod transaction;

use std::sync::Arc;

use crate::address_::Address;
use crate::error_::{ArborError, Result};
pub use config::{AuthToken, DriverConfig, DriverTarget, EmbeddedTarget, TargetParseError};
pub use record::Record;
use routing::registry::RoutingTableRegistry;
use session::retry::ExponentialBackoff;
use session::{Session, SessionBackend, SessionConfig};
use spi::{ConnectionProvider, CypherRunner, Rediscovery};

/// A driver for one ArborDB deployment.
///
/// The driver holds the shared machinery (connection provider, routing
/// tables, retry policy) and spawns [`Session`]s, see [`Driver::session()`].
/// There is no need to pool driver objects; usually, each application uses
/// one global driver per deployment.
///
/// Which constructor to use is determined by the URI scheme, see
/// [`DriverTarget::parse()`]:
///  * [`Driver::direct()`] for `bolt://` URIs,
///  * [`Driver::routing()`] for `bolt+routing://` URIs,
///  * [`Driver::embedded()`] for `file://` URIs.
///
/// The connection pool, the wire protocol, the rediscovery procedure, and the
/// embedded engine are supplied by the caller as [`spi`] capabilities.
#[derive(Debug)]
pub struct Driver {
    kind: DriverKind,
    retry_policy: ExponentialBackoff,
}

#[derive(Debug)]
enum DriverKind {
    Direct {
        provider: Arc<dyn ConnectionProvider>,
    },
    Routing {
        provider: Arc<dyn ConnectionProvider>,
        registry: Arc<RoutingTableRegistry>,
    },
    Embedded {
        runner: Arc<dyn CypherRunner>,
    },
}

impl Driver {
    /// Create a driver that talks to a single server, without routing.
    pub fn direct(provider: Arc<dyn ConnectionProvider>, config: DriverConfig) -> Self {
        Self {
            kind: DriverKind::Direct { provider },
            retry_policy: Self::retry_policy(&config),
        }
    }

    /// Create a driver that routes statements across a cluster.
    ///
    /// `initial_router` seeds the routing table of every database until the
    /// first rediscovery succeeds.
    pub fn routing(
        provider: Arc<dyn ConnectionProvider>,
        rediscovery: Arc<dyn Rediscovery>,
        initial_router: Address,
        config: DriverConfig,
    ) -> Self {
        let registry = Arc::new(RoutingTableRegistry::new(
            Arc::clone(&provider),
            rediscovery,
            Arc::new(initial_router),
            config.routing_table_purge_timeout(),
        ));
        Self {
            kind: DriverKind::Routing { provider, registry },
            retry_policy: Self::retry_policy(&config),
        }
    }

    /// Create a driver backed by an embedded, in-process engine.
    ///
    /// The embedded engine runs inside the client process: it supports
    /// neither authentication (`auth` must be [`AuthToken::none()`]) nor
    /// encryption ([`DriverConfig::with_encryption()`] must be off).
    pub fn embedded(
        runner: Arc<dyn CypherRunner>,
        auth: &AuthToken,
        config: DriverConfig,
    ) -> Result<Self> {
        if !auth.is_none() {
            return Err(ArborError::client(
                "Embedded connector doesn't support authentication.",
            ));
        }
        if config.encrypted() {
            return Err(ArborError::client(
                "Embedded driver starts an embedded database and cannot encrypt \
                 in-memory structures.",
            ));
        }
        Ok(Self {
            kind: DriverKind::Embedded { runner },
            retry_policy: Self::retry_policy(&config),
        })
    }

    fn retry_policy(config: &DriverConfig) -> ExponentialBackoff {
        ExponentialBackoff::new().with_max_retry_time(config.max_retry_time())
    }

    /// Spawn a new session.
    ///
    /// Fails with a client error when the session configuration requests
    /// features the driver variant does not support (currently: bookmarks on
    /// embedded drivers).
    pub fn session(&self, config: SessionConfig) -> Result<Session> {
        let backend = match &self.kind {
            DriverKind::Direct { provider } => SessionBackend::Direct {
                provider: Arc::clone(provider),
            },
            DriverKind::Routing { provider, registry } => SessionBackend::Routing {
                provider: Arc::clone(provider),
                registry: Arc::clone(registry),
            },
            DriverKind::Embedded { runner } => {
                if config.bookmarks().map(|b| !b.is_empty()).unwrap_or(false) {
                    return Err(ArborError::client(
                        "Embedded session does not support bookmarks",
                    ));
                }
                SessionBackend::Embedded {
                    runner: Arc::clone(runner),
                }
            }
        };
        Ok(Session::new(config, backend, self.retry_policy))
    }

    /// Close the driver and the connection provider behind it.
    pub fn close(&self) -> Result<()> {
        match &self.kind {
            DriverKind::Direct { provider } | DriverKind::Routing { provider, .. } => {
                provider.close()
            }
            DriverKind::Embedded { .. } => Ok(()),
        }
    }
}

/// Whether a unit of work reads from or writes to the database.
///
/// In a cluster, read work can be sent to any reader, while write work must
/// go to a writer. **Writers** are also known as **leaders**; **readers** are
/// also known as **followers** or **read replicas**.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RoutingControl {
    Read,
    Write,
}
