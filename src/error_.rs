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

use thiserror::Error;

/// Errors that can occur while using the driver.
///
/// **Important Notes on Usage:**
///  * Error messages are *not* considered part of the driver's API.
///    They may change at any time and don't follow semantic versioning.
///  * The [`ErrorKind`] is stable and is what retry logic and callers should
///    dispatch on.
///
/// An error may carry *suppressed* secondary errors.
/// For example, when a transaction commit fails while one of its result
/// cursors holds an unconsumed failure, the cursor failure is surfaced as the
/// primary error and the commit failure is attached via
/// [`ArborError::suppressed()`].
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ArborError {
    kind: ErrorKind,
    message: String,
    suppressed: Vec<ArborError>,
}

/// Classification of an [`ArborError`].
///
/// The retry logic ([`crate::retry`]) retries [`Transient`],
/// [`SessionExpired`], and [`ServiceUnavailable`] failures;
/// [`Client`] and [`Database`] failures are never retried.
///
/// [`Transient`]: ErrorKind::Transient
/// [`SessionExpired`]: ErrorKind::SessionExpired
/// [`ServiceUnavailable`]: ErrorKind::ServiceUnavailable
/// [`Client`]: ErrorKind::Client
/// [`Database`]: ErrorKind::Database
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The caller misused the driver (e.g., running a statement on a closed
    /// session, committing a rolled back transaction, an unsupported URI
    /// scheme).
    Client,
    /// A transient server-side condition; safe to retry.
    Transient,
    /// The server no longer serves the role this session was bound to
    /// (e.g., a writer was demoted); safe to retry against a fresh topology.
    SessionExpired,
    /// No server could be reached; safe to retry.
    ServiceUnavailable,
    /// The database failed to execute the statement.
    Database,
    /// The remote side or an spi implementation violated the protocol
    /// contract. This indicates a bug in the driver or the server.
    Protocol,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Client => "client error",
            ErrorKind::Transient => "transient error",
            ErrorKind::SessionExpired => "session expired",
            ErrorKind::ServiceUnavailable => "service unavailable",
            ErrorKind::Database => "database error",
            ErrorKind::Protocol => "protocol violation",
        };
        f.write_str(name)
    }
}

impl ArborError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suppressed: Vec::new(),
        }
    }

    /// A caller-misuse error ([`ErrorKind::Client`]).
    pub fn client(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Client, message)
    }

    /// A retryable transient failure ([`ErrorKind::Transient`]).
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// A retryable stale-role failure ([`ErrorKind::SessionExpired`]).
    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionExpired, message)
    }

    /// A retryable connectivity failure ([`ErrorKind::ServiceUnavailable`]).
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// A non-retryable failure reported by the database
    /// ([`ErrorKind::Database`]).
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// A violation of the protocol contract ([`ErrorKind::Protocol`]).
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    /// A [`ErrorKind::Client`] error for an operation that is not (yet)
    /// supported by the chosen driver variant.
    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Client,
            format!("unsupported operation: {}", message.into()),
        )
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the driver's retry logic considers this failure safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Transient | ErrorKind::SessionExpired | ErrorKind::ServiceUnavailable
        )
    }

    /// Attach a secondary error that occurred while handling this one.
    pub fn add_suppressed(&mut self, error: ArborError) {
        self.suppressed.push(error);
    }

    /// Secondary errors that occurred while handling this one.
    pub fn suppressed(&self) -> &[ArborError] {
        &self.suppressed
    }

    /// Combine two optional errors: the primary wins and the secondary is
    /// attached as suppressed.
    pub(crate) fn combine(
        primary: Option<ArborError>,
        secondary: Option<ArborError>,
    ) -> Option<ArborError> {
        match (primary, secondary) {
            (Some(mut primary), Some(secondary)) => {
                primary.add_suppressed(secondary);
                Some(primary)
            }
            (Some(primary), None) => Some(primary),
            (None, secondary) => secondary,
        }
    }
}

/// Used when navigating a [`ResultCursor`] fails because the stream does not
/// hold the expected number of records.
///
/// [`ResultCursor`]: crate::driver::cursor::ResultCursor
#[derive(Debug, Error)]
pub enum NoSuchRecordError {
    #[error("no records were found")]
    NoRecords,
    #[error("more than one record was found")]
    TooManyRecords,
}

impl From<NoSuchRecordError> for ArborError {
    fn from(err: NoSuchRecordError) -> Self {
        ArborError::client(format!("NoSuchRecordError: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ArborError>;
