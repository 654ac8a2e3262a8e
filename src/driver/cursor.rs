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

use std::cell::RefCell;
use std::iter::FusedIterator;
use std::rc::Rc;
use std::result;
use std::sync::Arc;

use duplicate::duplicate_item;
use log::info;

use super::record::Record;
use super::session::bookmarks::{Bookmarks, BookmarksHolder};
use super::session::Statement;
use super::spi::{Connection, RecordSource, SourceMeta};
use super::summary::Summary;
use crate::error_::{ArborError, NoSuchRecordError, Result};
use crate::value::ValueReceive;

/// A lazy, single-consumer stream of result records plus a terminal
/// [`Summary`].
///
/// The cursor implements [`Iterator`]; [`ResultCursor::peek()`] buffers at
/// most one record ahead of the iteration.
/// Every record is yielded at most once, in source order.
///
/// A cursor is owned by one consumer; it is not meant to be shared.
#[derive(Debug)]
pub struct ResultCursor {
    core: Rc<RefCell<CursorCore>>,
}

impl ResultCursor {
    pub(crate) fn new(core: Rc<RefCell<CursorCore>>) -> Self {
        Self { core }
    }

    /// The ordered column names of the result.
    pub fn keys(&self) -> Vec<Arc<String>> {
        self.core.borrow().keys.clone()
    }

    /// Whether another call to [`next()`](Iterator::next) will yield
    /// something (a record or a stream failure).
    pub fn has_next(&mut self) -> bool {
        self.core.borrow_mut().buffer_next()
    }

    /// Return the next record without consuming it.
    ///
    /// After `peek()` returned a record, the next call to
    /// [`next()`](Iterator::next) returns that same record.
    /// Fails with [`NoSuchRecordError::NoRecords`] on an exhausted cursor.
    pub fn peek(&mut self) -> result::Result<Result<Record>, NoSuchRecordError> {
        let mut core = self.core.borrow_mut();
        if !core.buffer_next() {
            return Err(NoSuchRecordError::NoRecords);
        }
        if let Some(error) = core.pending_failure.take() {
            return Ok(Err(error));
        }
        Ok(Ok(core
            .peeked
            .clone()
            .expect("buffer_next returned true without pending failure")))
    }

    /// Exhausts the stream and returns its single record.
    ///
    /// If any error occurs while consuming the stream, it is returned as
    /// `Ok(Err(error))`.
    /// If the stream holds zero or more than one record,
    /// `Err(NoSuchRecordError)` is returned; in the overflow case the
    /// remainder of the stream is discarded.
    pub fn single(&mut self) -> result::Result<Result<Record>, NoSuchRecordError> {
        match self.next() {
            Some(Ok(record)) => match self.next() {
                None => Ok(Ok(record)),
                Some(Err(e)) => Ok(Err(e)),
                Some(Ok(_)) => match self.exhaust() {
                    Ok(()) => Err(NoSuchRecordError::TooManyRecords),
                    Err(e) => Ok(Err(e)),
                },
            },
            Some(Err(e)) => Ok(Err(e)),
            None => Err(NoSuchRecordError::NoRecords),
        }
    }

    /// Collect all remaining records.
    pub fn list(&mut self) -> Result<Vec<Record>> {
        self.collect()
    }

    /// Collect all remaining records, applying `mapper` to each.
    pub fn list_with<T>(&mut self, mut mapper: impl FnMut(Record) -> T) -> Result<Vec<T>> {
        self.map(|record| record.map(&mut mapper)).collect()
    }

    /// Discard all remaining records and return the [`Summary`].
    ///
    /// The summary is computed at most once; repeated calls return the same
    /// [`Arc`].
    pub fn consume(&mut self) -> Result<Arc<Summary>> {
        self.exhaust()?;
        self.core.borrow_mut().summary()
    }

    /// Same as [`ResultCursor::consume()`].
    pub fn summary(&mut self) -> Result<Arc<Summary>> {
        self.consume()
    }

    fn exhaust(&mut self) -> Result<()> {
        self.try_for_each(|record| record.map(drop))
    }
}

impl Iterator for ResultCursor {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.core.borrow_mut().fetch_next()
    }
}

impl FusedIterator for ResultCursor {}

#[derive(Debug)]
enum StreamState {
    Streaming,
    Finished,
    Failed,
}

impl StreamState {
    #[allow(dead_code)] // cover all states
    #[duplicate_item(
        fn_name          variant;
        [ is_streaming ] [ Streaming ];
        [ is_finished ]  [ Finished ];
        [ is_failed ]    [ Failed ];
    )]
    fn fn_name(&self) -> bool {
        matches!(self, StreamState::variant)
    }
}

/// The cursor's shared state.
///
/// Held by the public [`ResultCursor`], by the owning session (to drain an
/// unconsumed failure before the next operation), and — for statements run
/// inside an explicit transaction — by the transaction's cursor holder.
#[derive(Debug)]
pub(crate) struct CursorCore {
    statement: Statement,
    source: Box<dyn RecordSource>,
    keys: Vec<Arc<String>>,
    peeked: Option<Record>,
    pending_failure: Option<ArborError>,
    state: StreamState,
    failure: Option<ArborError>,
    final_meta: Option<SourceMeta>,
    summary: Option<Arc<Summary>>,
    connection: Option<Rc<RefCell<Box<dyn Connection>>>>,
    bookmarks: Option<BookmarksHolder>,
}

impl CursorCore {
    /// `connection` and `bookmarks` are only passed for auto-commit cursors:
    /// the connection is released and the session bookmarks updated when the
    /// stream reaches its end.
    pub(crate) fn new(
        statement: Statement,
        source: Box<dyn RecordSource>,
        connection: Option<Rc<RefCell<Box<dyn Connection>>>>,
        bookmarks: Option<BookmarksHolder>,
    ) -> Self {
        let keys = source.keys();
        Self {
            statement,
            source,
            keys,
            peeked: None,
            pending_failure: None,
            state: StreamState::Streaming,
            failure: None,
            final_meta: None,
            summary: None,
            connection,
            bookmarks,
        }
    }

    pub(crate) fn fetch_next(&mut self) -> Option<Result<Record>> {
        if let Some(record) = self.peeked.take() {
            return Some(Ok(record));
        }
        if let Some(error) = self.pending_failure.take() {
            return Some(Err(error));
        }
        if !self.state.is_streaming() {
            return None;
        }
        match self.source.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => match self.complete() {
                Ok(()) => None,
                Err(error) => Some(Err(error)),
            },
            Err(error) => {
                self.fail(error.clone());
                Some(Err(error))
            }
        }
    }

    /// Make sure the single-slot buffer holds the next record (or the next
    /// failure); returns whether it does.
    fn buffer_next(&mut self) -> bool {
        if self.peeked.is_some() || self.pending_failure.is_some() {
            return true;
        }
        match self.fetch_next() {
            Some(Ok(record)) => {
                self.peeked = Some(record);
                true
            }
            Some(Err(error)) => {
                self.pending_failure = Some(error);
                true
            }
            None => false,
        }
    }

    /// Drain the stream, discarding records, and return its failure (if any).
    ///
    /// Used by the session before starting the next operation and by the
    /// transaction before commit/rollback; a failure is reported even when it
    /// was already surfaced to the iterating consumer.
    pub(crate) fn consume_failure(&mut self) -> Option<ArborError> {
        loop {
            match self.fetch_next() {
                Some(Ok(_)) => continue,
                Some(Err(error)) => return Some(error),
                None => break,
            }
        }
        self.failure.clone()
    }

    fn summary(&mut self) -> Result<Arc<Summary>> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        if let Some(summary) = &self.summary {
            return Ok(Arc::clone(summary));
        }
        let meta = self.final_meta.take().unwrap_or_default();
        let summary = Arc::new(Summary::parse(meta)?);
        self.summary = Some(Arc::clone(&summary));
        Ok(summary)
    }

    fn complete(&mut self) -> Result<()> {
        let mut meta = match self.source.finish() {
            Ok(meta) => meta,
            Err(error) => {
                self.fail(error.clone());
                return Err(error);
            }
        };
        if let Some(ValueReceive::String(bookmark)) = meta.remove("bookmark") {
            if let Some(bookmarks) = &self.bookmarks {
                bookmarks.replace(Bookmarks::from_raw([bookmark]));
            }
        }
        self.final_meta = Some(meta);
        self.state = StreamState::Finished;
        self.release_connection();
        Ok(())
    }

    fn fail(&mut self, error: ArborError) {
        info!(
            "result stream of statement {:?} failed: {}",
            self.statement.text(),
            error
        );
        self.state = StreamState::Failed;
        self.failure = Some(error);
        self.release_connection();
    }

    fn release_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(error) = connection.borrow_mut().release() {
                info!(
                    "ignored connection release error after result stream end: {}",
                    error
                );
            }
        }
    }
}
