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

use std::fmt::{Display, Formatter};

/// The port used when an address (or URI) does not specify one.
pub const DEFAULT_PORT: u16 = 7687;

/// A server address, i.e., a host name (or IP) and a port.
///
/// Name resolution is left to the connection pool; the driver core treats
/// addresses as opaque identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl<T: Into<String>> From<(T, u16)> for Address {
    fn from((host, port): (T, u16)) -> Self {
        Self::new(host, port)
    }
}

impl From<&str> for Address {
    /// Parse `host[:port]`, defaulting the port to [`DEFAULT_PORT`].
    fn from(value: &str) -> Self {
        match value.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => Self::new(host, port),
                Err(_) => Self::new(value, DEFAULT_PORT),
            },
            None => Self::new(value, DEFAULT_PORT),
        }
    }
}
