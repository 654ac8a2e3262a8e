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

use std::result::Result as StdResult;
use std::thread::sleep;
use std::time::{Duration, Instant};

use log::warn;
use rand::Rng;
use thiserror::Error;

use crate::error_::{ArborError, Result};

// imports for docs
#[allow(unused)]
use crate::driver::session::Session;

/// Specifies how to retry a unit of work.
///
/// The driver uses this trait in [`Session::read_transaction()`] and
/// [`Session::write_transaction()`].
/// A default implementation is provided through [`ExponentialBackoff`].
///
/// The blocking retry loop runs on the caller's thread — including the sleep
/// between attempts. Callers must therefore never invoke it from a thread
/// that is needed to make I/O progress.
pub trait RetryPolicy {
    type Error;

    fn execute<R>(&self, work: impl FnMut() -> Result<R>) -> StdResult<R, Self::Error>;
}

/// [`RetryPolicy`] that retries work with exponential backoff.
///
/// Exponential backoff means that the pause between attempts grows
/// geometrically:
///  * work fails → wait 1 second
///  * work fails → wait 2 seconds
///  * work fails → wait 4 seconds
///  * ...
///
/// Each pause is additionally jittered by a random factor of `(0.8..=1.2)`.
/// Only failures for which [`ArborError::is_retryable()`] holds are retried;
/// everything else is re-thrown immediately.
///
/// By default, the policy retries for up to 30 seconds in total; this can be
/// changed with [`ExponentialBackoff::with_max_retry_time()`].
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_retry_time: Duration,
    factor: f64,
    jitter: f64,
}

impl Default for ExponentialBackoff {
    #[inline]
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_retry_time: Duration::from_secs(30),
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl ExponentialBackoff {
    /// Create a new exponential backoff policy with default settings.
    ///
    /// Same as [`ExponentialBackoff::default()`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change for how long the policy will retry, before giving up.
    #[inline]
    pub fn with_max_retry_time(self, max_retry_time: Duration) -> Self {
        Self {
            max_retry_time,
            ..self
        }
    }

    /// Change the pause before the first retry.
    #[inline]
    pub fn with_initial_delay(self, initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            ..self
        }
    }

    fn max_retries(&self) -> usize {
        /*
        init * min_jitter * (factor ^ (x + 1) - 1) <= max_retry_time
        <=> x <= log factor (max_retry_time / (init * min_jitter) + 1) - 1
         */
        assert!(self.initial_delay > Duration::ZERO);
        assert!(self.max_retry_time > Duration::ZERO);
        let max_time = self.max_retry_time.as_secs_f64();
        let init = self.initial_delay.as_secs_f64();
        let min_jitter = self.factor * self.jitter;
        ((1.0 + max_time / (init * min_jitter)).log(self.factor) - 1.0).ceil() as usize
    }
}

/// Error type returned by [`ExponentialBackoff::execute()`] to distinguish a
/// non-retryable failure from an exhausted retry budget.
#[derive(Error, Debug)]
pub enum RetryError {
    /// The work failed with a non-retryable driver error.
    #[error("non-retryable error occurred: {0}")]
    DriverError(#[from] ArborError),
    /// The retry budget was exhausted while retrying.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

/// Used to indicate that a retry loop timed out.
///
/// All errors encountered during the retry loop are collected and can be
/// accessed through [`TimeoutError::errors`].
#[derive(Error, Debug)]
#[error("timeout occurred while retrying; last error: {}", .errors.last().expect("timeout requires at least one error"))]
pub struct TimeoutError {
    /// Errors encountered during the retry loop, oldest first.
    pub errors: Vec<ArborError>,
}

impl From<TimeoutError> for Vec<ArborError> {
    fn from(value: TimeoutError) -> Self {
        value.errors
    }
}

impl RetryPolicy for &ExponentialBackoff {
    type Error = RetryError;

    fn execute<R>(&self, mut work: impl FnMut() -> Result<R>) -> StdResult<R, Self::Error> {
        assert!(self.jitter >= 0.0);
        assert!(self.jitter < 1.0);
        let mut time_start = None;
        let mut errors: Option<Vec<ArborError>> = None;
        let mut current_delay = self.initial_delay.as_secs_f64();
        let mut rng = rand::rng();
        loop {
            let res = work();
            if time_start.is_none() {
                time_start = Some(Instant::now());
            }
            let err = match res {
                Err(e) if e.is_retryable() => e,
                _ => return res.map_err(Into::into),
            };
            errors
                .get_or_insert_with(|| Vec::with_capacity(self.max_retries()))
                .push(err);
            let time_elapsed = time_start.expect("set right after work above").elapsed();
            if time_elapsed > self.max_retry_time {
                return Err(TimeoutError {
                    errors: errors.expect("pushed at least one error above"),
                }
                .into());
            }
            let jitter_factor = 1.0 + rng.random_range(-self.jitter..=self.jitter);
            let jittered_delay = current_delay * jitter_factor;
            warn!(
                "transaction failed and will be retried in {:.4} seconds: {}",
                jittered_delay,
                errors
                    .as_ref()
                    .and_then(|errors| errors.last())
                    .expect("pushed at least one error above")
            );
            sleep(Duration::try_from_secs_f64(jittered_delay).unwrap_or(Duration::MAX));
            current_delay *= self.factor;
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    type Error = <&'static ExponentialBackoff as RetryPolicy>::Error;

    fn execute<R>(&self, work: impl FnMut() -> Result<R>) -> StdResult<R, Self::Error> {
        (&self).execute(work)
    }
}
