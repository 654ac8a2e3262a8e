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
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use super::cursor::{CursorCore, ResultCursor};
use super::session::bookmarks::BookmarksHolder;
use super::session::Statement;
use super::spi::{Connection, CypherRunner, EngineTransaction};
use crate::error_::{ArborError, Result};
use crate::value::ValueSend;

/// Configuration applied to a single transaction (explicit or auto-commit).
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    timeout: Option<Duration>,
    metadata: HashMap<String, ValueSend>,
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instruct the server (or engine) to abort the transaction after the
    /// given timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach metadata to the transaction; it is forwarded to the server
    /// verbatim and shows up in its query log.
    pub fn with_metadata(mut self, metadata: HashMap<String, ValueSend>) -> Self {
        self.metadata = metadata;
        self
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The timeout as it is put on the wire.
    #[inline]
    pub fn timeout_millis(&self) -> Option<i64> {
        self.timeout
            .map(|timeout| i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX))
    }

    #[inline]
    pub fn metadata(&self) -> &HashMap<String, ValueSend> {
        &self.metadata
    }
}

/// Lifecycle of a [`Transaction`].
///
/// `Committed` and `RolledBack` are terminal.
/// `Terminated` is reached through [`Session::reset()`]; the only way out of
/// it is a rollback (commit is forbidden).
///
/// [`Session::reset()`]: crate::session::Session::reset
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    MarkedSuccess,
    MarkedFailure,
    Terminated,
    Committed,
    RolledBack,
}

impl TransactionState {
    /// Whether the transaction still occupies its session slot.
    #[inline]
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Committed | Self::RolledBack)
    }
}

/// An explicit transaction.
///
/// Obtained from [`Session::begin_transaction()`] and handed to the work
/// function of [`Session::read_transaction()`] /
/// [`Session::write_transaction()`].
///
/// A transaction is ended by [`commit()`](Transaction::commit),
/// [`rollback()`](Transaction::rollback), or [`close()`](Transaction::close);
/// `close()` commits if and only if [`success()`](Transaction::success) was
/// called and not overridden by [`failure()`](Transaction::failure).
/// Dropping an open transaction closes it, swallowing any error.
///
/// [`Session::begin_transaction()`]: crate::session::Session::begin_transaction
/// [`Session::read_transaction()`]: crate::session::Session::read_transaction
/// [`Session::write_transaction()`]: crate::session::Session::write_transaction
#[derive(Debug)]
pub struct Transaction {
    core: Rc<RefCell<TxCore>>,
}

impl Transaction {
    pub(crate) fn new(core: Rc<RefCell<TxCore>>) -> Self {
        Self { core }
    }

    /// Run a statement inside this transaction.
    ///
    /// Statements are dispatched in caller order; a failed statement poisons
    /// the transaction and subsequent statements as well as the commit.
    pub fn run(&mut self, statement: impl Into<Statement>) -> Result<ResultCursor> {
        let core = self.core.borrow_mut().run(statement.into())?;
        Ok(ResultCursor::new(core))
    }

    /// Mark this transaction to be committed on [`close()`](Self::close).
    ///
    /// No-op unless the transaction is [`TransactionState::Active`].
    pub fn success(&mut self) {
        self.core.borrow_mut().success();
    }

    /// Mark this transaction to be rolled back on [`close()`](Self::close),
    /// overriding a previous [`success()`](Self::success).
    pub fn failure(&mut self) {
        self.core.borrow_mut().failure();
    }

    /// Commit the transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.core.borrow_mut().commit()
    }

    /// Roll the transaction back.
    pub fn rollback(&mut self) -> Result<()> {
        self.core.borrow_mut().rollback()
    }

    /// End the transaction: commit if it was marked successful, roll back
    /// otherwise. No-op when already ended.
    pub fn close(&mut self) -> Result<()> {
        self.core.borrow_mut().close()
    }

    pub fn is_open(&self) -> bool {
        self.core.borrow().is_open()
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> TransactionState {
        self.core.borrow().state
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.is_open() {
            return;
        }
        if let Err(error) = self.close() {
            info!("ignored error closing transaction on drop: {}", error);
        }
    }
}

/// The transaction state shared between the public handle and the owning
/// session.
///
/// The lifecycle state machine is common; `seat` carries what differs
/// between the network-backed and the engine-backed variant.
#[derive(Debug)]
pub(crate) struct TxCore {
    state: TransactionState,
    cursors: ResultCursorsHolder,
    seat: TxSeat,
}

#[derive(Debug)]
enum TxSeat {
    Network {
        connection: Rc<RefCell<Box<dyn Connection>>>,
        bookmarks: BookmarksHolder,
    },
    Embedded {
        runner: Arc<dyn CypherRunner>,
        engine_tx: Option<Box<dyn EngineTransaction>>,
    },
}

impl TxCore {
    pub(crate) fn network(
        connection: Rc<RefCell<Box<dyn Connection>>>,
        bookmarks: BookmarksHolder,
    ) -> Self {
        Self {
            state: TransactionState::Active,
            cursors: ResultCursorsHolder::default(),
            seat: TxSeat::Network {
                connection,
                bookmarks,
            },
        }
    }

    pub(crate) fn embedded(
        runner: Arc<dyn CypherRunner>,
        engine_tx: Box<dyn EngineTransaction>,
    ) -> Self {
        Self {
            state: TransactionState::Active,
            cursors: ResultCursorsHolder::default(),
            seat: TxSeat::Embedded {
                runner,
                engine_tx: Some(engine_tx),
            },
        }
    }

    #[inline]
    pub(crate) fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn success(&mut self) {
        if self.state == TransactionState::Active {
            self.state = TransactionState::MarkedSuccess;
        }
    }

    fn failure(&mut self) {
        if matches!(
            self.state,
            TransactionState::Active | TransactionState::MarkedSuccess
        ) {
            self.state = TransactionState::MarkedFailure;
        }
    }

    pub(crate) fn mark_terminated(&mut self) {
        if self.state.is_open() {
            self.state = TransactionState::Terminated;
        }
    }

    pub(crate) fn commit(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Committed => return Ok(()),
            TransactionState::RolledBack => {
                return Err(ArborError::client(
                    "Can't commit, transaction has been rolled back",
                ))
            }
            _ => {}
        }
        let cursor_error = self.cursors.retrieve_not_consumed_error();
        let commit_result = if self.state == TransactionState::Terminated {
            Err(ArborError::client(
                "Transaction can't be committed. It has been rolled back either \
                 because of an error or explicit termination",
            ))
        } else {
            self.do_commit()
        };
        self.transaction_closed(TransactionState::Committed);
        match ArborError::combine(cursor_error, commit_result.err()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub(crate) fn rollback(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Committed => {
                return Err(ArborError::client(
                    "Can't rollback, transaction has been committed",
                ))
            }
            TransactionState::RolledBack => return Ok(()),
            _ => {}
        }
        let cursor_error = self.cursors.retrieve_not_consumed_error();
        let rollback_result = if self.state == TransactionState::Terminated {
            // the server already rolled the transaction back when it was
            // terminated; nothing to ask of it
            Ok(())
        } else {
            self.do_rollback()
        };
        self.transaction_closed(TransactionState::RolledBack);
        match ArborError::combine(cursor_error, rollback_result.err()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        match self.state {
            TransactionState::MarkedSuccess => self.commit(),
            TransactionState::Committed | TransactionState::RolledBack => Ok(()),
            _ => self.rollback(),
        }
    }

    fn run(&mut self, statement: Statement) -> Result<Rc<RefCell<CursorCore>>> {
        self.ensure_can_run_queries()?;
        let source = match &mut self.seat {
            TxSeat::Network { connection, .. } => {
                let protocol = connection.borrow().protocol();
                let mut connection = connection.borrow_mut();
                protocol.run_in_explicit_transaction(connection.as_mut(), &statement, true)?
            }
            TxSeat::Embedded { runner, .. } => runner.execute(&statement)?,
        };
        let core = Rc::new(RefCell::new(CursorCore::new(statement, source, None, None)));
        self.cursors.add(Rc::clone(&core));
        Ok(core)
    }

    fn ensure_can_run_queries(&self) -> Result<()> {
        match self.state {
            TransactionState::Committed => Err(ArborError::client(
                "Cannot run more statements in this transaction, it has been committed",
            )),
            TransactionState::RolledBack => Err(ArborError::client(
                "Cannot run more statements in this transaction, it has been rolled back",
            )),
            TransactionState::MarkedFailure => Err(ArborError::client(
                "Cannot run more statements in this transaction, it has been marked for \
                 failure. Please either rollback or close this transaction",
            )),
            TransactionState::Terminated => Err(ArborError::client(
                "Cannot run more statements in this transaction, it has either experienced \
                 a fatal error or was explicitly terminated",
            )),
            TransactionState::Active | TransactionState::MarkedSuccess => Ok(()),
        }
    }

    fn do_commit(&mut self) -> Result<()> {
        match &mut self.seat {
            TxSeat::Network {
                connection,
                bookmarks,
            } => {
                let protocol = connection.borrow().protocol();
                let new_bookmarks = {
                    let mut connection = connection.borrow_mut();
                    protocol.commit_transaction(connection.as_mut())?
                };
                bookmarks.replace(new_bookmarks);
                Ok(())
            }
            TxSeat::Embedded { engine_tx, .. } => engine_tx
                .take()
                .ok_or_else(|| {
                    ArborError::protocol_error("engine transaction has already been finished")
                })?
                .commit(),
        }
    }

    fn do_rollback(&mut self) -> Result<()> {
        match &mut self.seat {
            TxSeat::Network { connection, .. } => {
                let protocol = connection.borrow().protocol();
                let mut connection = connection.borrow_mut();
                protocol.rollback_transaction(connection.as_mut())
            }
            TxSeat::Embedded { engine_tx, .. } => match engine_tx.take() {
                Some(mut engine_tx) => engine_tx.rollback(),
                None => Ok(()),
            },
        }
    }

    /// Enter the terminal state and give up the underlying resources.
    ///
    /// The state is entered even when the commit/rollback round trip failed;
    /// the transaction is gone either way.
    fn transaction_closed(&mut self, new_state: TransactionState) {
        self.state = new_state;
        match &mut self.seat {
            TxSeat::Network { connection, .. } => {
                if let Err(error) = connection.borrow_mut().release() {
                    info!(
                        "ignored connection release error after transaction end: {}",
                        error
                    );
                }
            }
            TxSeat::Embedded { engine_tx, .. } => {
                if let Some(mut engine_tx) = engine_tx.take() {
                    if let Err(error) = engine_tx.rollback() {
                        info!(
                            "ignored engine rollback error after transaction end: {}",
                            error
                        );
                    }
                }
            }
        }
    }
}

/// Ordered, append-only list of the cursors a transaction has spawned.
#[derive(Debug, Default)]
pub(crate) struct ResultCursorsHolder {
    cursors: Vec<Rc<RefCell<CursorCore>>>,
}

impl ResultCursorsHolder {
    fn add(&mut self, cursor: Rc<RefCell<CursorCore>>) {
        self.cursors.push(cursor);
    }

    /// Drain all held cursors in order and return the first failure.
    ///
    /// Must be called before commit and before rollback so that a poisoned
    /// statement surfaces instead of being silently dropped.
    fn retrieve_not_consumed_error(&mut self) -> Option<ArborError> {
        let mut first_error = None;
        for cursor in &self.cursors {
            let error = cursor.borrow_mut().consume_failure();
            if let (None, Some(error)) = (&first_error, error) {
                first_error = Some(error);
            }
        }
        first_error
    }
}

// imports for docs
#[allow(unused)]
use crate::driver::session::Session;
