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

pub(crate) mod bookmarks;
pub(crate) mod retry;

use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;
use std::result::Result as StdResult;
use std::sync::Arc;

use log::{debug, info};

use super::cursor::{CursorCore, ResultCursor};
use super::routing::registry::RoutingTableRegistry;
use super::spi::{Connection, ConnectionProvider, CypherRunner};
use super::transaction::{Transaction, TransactionConfig, TxCore};
use super::RoutingControl;
use crate::error_::{ArborError, Result};
use crate::value::ValueSend;
use bookmarks::{Bookmarks, BookmarksHolder};
use retry::{ExponentialBackoff, RetryError, RetryPolicy};

const SESSION_CLOSED: &str =
    "No more interaction with this session are allowed as the current session is already closed.";
const NO_TX_BEFORE_STATEMENT: &str =
    "Statements cannot be run directly on a session with an open transaction; \
     either run from within the transaction or use a different session.";
const NO_TX_BEFORE_TX: &str =
    "You cannot begin a transaction on a session with an open transaction; \
     either run from within the transaction or use a different session.";
const BOOKMARKS_NOT_SUPPORTED: &str = "Embedded session does not support bookmarks";

/// A parameterised statement: the query text plus its parameters.
///
/// Always prefer parameters over string interpolation — it avoids injection
/// vulnerabilities and lets the server cache the query plan.
///
/// # Example
/// ```
/// use arbordb::session::Statement;
/// use arbordb::value_map;
///
/// let statement = Statement::new("CREATE (n:Node {id: $id})")
///     .with_parameters(value_map!({"id": 1}));
/// assert_eq!(statement.text(), "CREATE (n:Node {id: $id})");
/// ```
#[derive(Debug, Clone)]
pub struct Statement {
    text: String,
    parameters: HashMap<String, ValueSend>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, ValueSend>) -> Self {
        self.parameters = parameters;
        self
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn parameters(&self) -> &HashMap<String, ValueSend> {
        &self.parameters
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Configuration for a [`Session`], see [`Driver::session()`].
///
/// [`Driver::session()`]: crate::driver::Driver::session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    routing_control: RoutingControl,
    bookmarks: Option<Bookmarks>,
    database: Option<Arc<String>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            routing_control: RoutingControl::Write,
            bookmarks: None,
            database: None,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether statements run through this session target readers or writers
    /// (default: [`RoutingControl::Write`]).
    /// [`Session::read_transaction()`] and [`Session::write_transaction()`]
    /// override this per unit of work.
    pub fn with_routing_control(mut self, routing_control: RoutingControl) -> Self {
        self.routing_control = routing_control;
        self
    }

    /// Bookmarks to causally chain this session after (see
    /// [crate docs](crate#causal-consistency)).
    pub fn with_bookmarks(mut self, bookmarks: Bookmarks) -> Self {
        self.bookmarks = Some(bookmarks);
        self
    }

    /// The database to run against; the server's default database when
    /// absent.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(Arc::new(database.into()));
        self
    }

    pub(crate) fn bookmarks(&self) -> Option<&Bookmarks> {
        self.bookmarks.as_ref()
    }
}

/// A session is a serial scope over the database.
///
/// It permits at most one open transaction and at most one outstanding
/// result cursor; the second concurrent use fails with a client error.
/// Within one session, operations observe program order; between sessions no
/// ordering is implied.
///
/// Sessions automatically provide [causal chaining](crate#causal-consistency):
/// each transaction can read the results of every previous transaction in
/// the same session.
///
/// See [`Driver::session()`].
///
/// [`Driver::session()`]: crate::driver::Driver::session
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    backend: SessionBackend,
    retry_policy: ExponentialBackoff,
    bookmarks: BookmarksHolder,
    pipeline: SessionPipeline,
    connection: Option<Rc<RefCell<Box<dyn Connection>>>>,
    open: bool,
}

#[derive(Debug)]
pub(crate) enum SessionBackend {
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

/// What the session is currently occupied with.
///
/// Each operation transitions this machine; transitioning is the only place
/// where the previous occupant is inspected (for overlap) and drained (for
/// an unconsumed failure).
#[derive(Debug)]
enum SessionPipeline {
    Idle,
    Running(Rc<RefCell<CursorCore>>),
    InTransaction(Rc<RefCell<TxCore>>),
}

impl Session {
    pub(crate) fn new(
        config: SessionConfig,
        backend: SessionBackend,
        retry_policy: ExponentialBackoff,
    ) -> Self {
        let bookmarks = BookmarksHolder::new(config.bookmarks.clone().unwrap_or_default());
        Self {
            config,
            backend,
            retry_policy,
            bookmarks,
            pipeline: SessionPipeline::Idle,
            connection: None,
            open: true,
        }
    }

    /// Run a single statement in an auto-commit transaction.
    ///
    /// The transaction is managed by the server; the only guarantee given is
    /// that it has been committed once the returned cursor is fully
    /// consumed.
    ///
    /// Fails with a client error when this session still has an open
    /// transaction.
    pub fn run(
        &mut self,
        statement: impl Into<Statement>,
        config: TransactionConfig,
    ) -> Result<ResultCursor> {
        let statement = statement.into();
        self.ensure_open()?;
        self.ensure_no_open_transaction(NO_TX_BEFORE_STATEMENT)?;
        self.drain_previous_cursor()?;

        if matches!(self.backend, SessionBackend::Embedded { .. }) {
            return Err(ArborError::unsupported_operation(
                "statement execution outside an explicit transaction is not yet \
                 supported on embedded sessions",
            ));
        }

        debug!("running auto-commit statement: {:?}", statement.text());
        let connection = self.acquire_connection(self.config.routing_control)?;
        let protocol = connection.borrow().protocol();
        let session_bookmarks = self.bookmarks.current();
        let dispatched = {
            let mut connection = connection.borrow_mut();
            protocol.run_in_auto_commit_transaction(
                connection.as_mut(),
                &statement,
                &session_bookmarks,
                &config,
                true,
            )
        };
        let source = match dispatched {
            Ok(source) => source,
            Err(error) => {
                connection
                    .borrow_mut()
                    .terminate_and_release("auto-commit statement dispatch failed");
                self.connection = None;
                self.pipeline = SessionPipeline::Idle;
                return Err(error);
            }
        };
        let core = Rc::new(RefCell::new(CursorCore::new(
            statement,
            source,
            Some(Rc::clone(&connection)),
            Some(self.bookmarks.clone()),
        )));
        self.pipeline = SessionPipeline::Running(Rc::clone(&core));
        Ok(ResultCursor::new(core))
    }

    /// Open an explicit transaction.
    ///
    /// Fails with a client error when this session still has an open
    /// transaction.
    pub fn begin_transaction(&mut self, config: TransactionConfig) -> Result<Transaction> {
        self.begin_transaction_with_mode(self.config.routing_control, config)
    }

    fn begin_transaction_with_mode(
        &mut self,
        mode: RoutingControl,
        config: TransactionConfig,
    ) -> Result<Transaction> {
        self.ensure_open()?;
        self.ensure_no_open_transaction(NO_TX_BEFORE_TX)?;
        self.drain_previous_cursor()?;

        let core = match &self.backend {
            SessionBackend::Embedded { runner } => {
                let engine_tx = runner.begin_transaction(config.timeout())?;
                TxCore::embedded(Arc::clone(runner), engine_tx)
            }
            _ => {
                let connection = self.acquire_connection(mode)?;
                let protocol = connection.borrow().protocol();
                let session_bookmarks = self.bookmarks.current();
                let begun = {
                    let mut connection = connection.borrow_mut();
                    protocol.begin_transaction(connection.as_mut(), &session_bookmarks, &config)
                };
                if let Err(error) = begun {
                    // transaction can't be started, the connection is of no
                    // further use to this operation
                    if let Err(release_error) = connection.borrow_mut().release() {
                        info!(
                            "ignored connection release error after failed transaction \
                             begin: {}",
                            release_error
                        );
                    }
                    self.connection = None;
                    return Err(error);
                }
                TxCore::network(connection, self.bookmarks.clone())
            }
        };
        let core = Rc::new(RefCell::new(core));
        self.pipeline = SessionPipeline::InTransaction(Rc::clone(&core));
        Ok(Transaction::new(core))
    }

    /// Run a unit of work in a read transaction under the driver's retry
    /// policy.
    ///
    /// On success the transaction is committed; when `work` fails it is
    /// rolled back and — for retryable failures within the retry budget —
    /// replayed in a fresh transaction.
    ///
    /// `work` must be idempotent from the database's point of view, as it
    /// may run multiple times.
    pub fn read_transaction<R>(
        &mut self,
        config: TransactionConfig,
        work: impl FnMut(&mut Transaction) -> Result<R>,
    ) -> StdResult<R, RetryError> {
        self.transaction_with_retry(RoutingControl::Read, config, work)
    }

    /// Run a unit of work in a write transaction under the driver's retry
    /// policy.
    ///
    /// See [`Session::read_transaction()`].
    pub fn write_transaction<R>(
        &mut self,
        config: TransactionConfig,
        work: impl FnMut(&mut Transaction) -> Result<R>,
    ) -> StdResult<R, RetryError> {
        self.transaction_with_retry(RoutingControl::Write, config, work)
    }

    fn transaction_with_retry<R>(
        &mut self,
        mode: RoutingControl,
        config: TransactionConfig,
        mut work: impl FnMut(&mut Transaction) -> Result<R>,
    ) -> StdResult<R, RetryError> {
        // The retry loop runs (and sleeps) on the caller's thread; I/O
        // progresses on whatever the connection provider uses underneath.
        let retry_policy = self.retry_policy;
        retry_policy.execute(|| self.execute_work(mode, &config, &mut work))
    }

    pub(crate) fn execute_work<R>(
        &mut self,
        mode: RoutingControl,
        config: &TransactionConfig,
        work: &mut impl FnMut(&mut Transaction) -> Result<R>,
    ) -> Result<R> {
        let mut tx = self.begin_transaction_with_mode(mode, config.clone())?;
        match work(&mut tx) {
            Ok(result) => {
                tx.success();
                tx.close()?;
                Ok(result)
            }
            Err(error) => {
                // the unit of work failed; this overrides any success mark
                // it may have set
                tx.failure();
                if let Err(close_error) = tx.close() {
                    info!(
                        "while propagating user code error: ignored tx.close() error: {}",
                        close_error
                    );
                }
                Err(error)
            }
        }
    }

    /// Best-effort cancellation of in-flight work.
    ///
    /// Marks the current transaction (if any) as terminated and asks the
    /// connection to send a protocol reset.
    pub fn reset(&mut self) -> Result<()> {
        if let SessionPipeline::InTransaction(tx) = &self.pipeline {
            tx.borrow_mut().mark_terminated();
        }
        if let Some(connection) = &self.connection {
            let mut connection = connection.borrow_mut();
            if connection.is_open() {
                connection.reset()?;
            }
        }
        Ok(())
    }

    /// Close the session.
    ///
    /// Drains the pending cursor's error, closes any open transaction
    /// (committing iff it was marked successful), and releases the
    /// connection. Idempotent.
    ///
    /// When both the pending cursor and the transaction close fail, the
    /// cursor failure is the primary error and the close failure is attached
    /// as suppressed.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let mut cursor_error = None;
        let mut tx_close_error = None;
        match mem::replace(&mut self.pipeline, SessionPipeline::Idle) {
            SessionPipeline::Idle => {}
            SessionPipeline::Running(cursor) => {
                cursor_error = cursor.borrow_mut().consume_failure();
            }
            SessionPipeline::InTransaction(tx) => {
                let mut tx = tx.borrow_mut();
                if tx.is_open() {
                    tx_close_error = tx.close().err();
                }
            }
        }
        let release_error = match self.connection.take() {
            Some(connection) => connection.borrow_mut().release().err(),
            None => None,
        };
        let secondary = ArborError::combine(tx_close_error, release_error);
        match ArborError::combine(cursor_error, secondary) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// The last bookmark received by the session, or the last one it was
    /// initialized with.
    ///
    /// Can be used to causally chain sessions; fails on embedded sessions,
    /// which do not support bookmarks.
    pub fn last_bookmark(&self) -> Result<Option<String>> {
        if matches!(self.backend, SessionBackend::Embedded { .. }) {
            return Err(ArborError::client(BOOKMARKS_NOT_SUPPORTED));
        }
        Ok(self.bookmarks.last_bookmark())
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.open {
            return Err(ArborError::client(SESSION_CLOSED));
        }
        Ok(())
    }

    fn ensure_no_open_transaction(&self, message: &str) -> Result<()> {
        if let SessionPipeline::InTransaction(tx) = &self.pipeline {
            if tx.borrow().is_open() {
                return Err(ArborError::client(message));
            }
        }
        Ok(())
    }

    /// Drain the previous auto-commit cursor (if any) so that an unconsumed
    /// failure fails the new operation fast instead of poisoning it through
    /// a broken connection.
    fn drain_previous_cursor(&mut self) -> Result<()> {
        let previous = match &self.pipeline {
            SessionPipeline::Running(cursor) => Some(Rc::clone(cursor)),
            _ => None,
        };
        if let Some(cursor) = previous {
            self.pipeline = SessionPipeline::Idle;
            if let Some(error) = cursor.borrow_mut().consume_failure() {
                return Err(error);
            }
        }
        Ok(())
    }

    fn acquire_connection(
        &mut self,
        mode: RoutingControl,
    ) -> Result<Rc<RefCell<Box<dyn Connection>>>> {
        if let Some(previous) = self.connection.take() {
            // the previous operation's connection must have been returned to
            // the pool by now
            assert!(
                !previous.borrow().is_open(),
                "existing open connection detected"
            );
        }
        let provider = match &self.backend {
            SessionBackend::Direct { provider } => provider,
            SessionBackend::Routing { provider, registry } => {
                registry.ensure_routing_table(self.config.database.clone(), mode)?;
                provider
            }
            SessionBackend::Embedded { .. } => {
                unreachable!("embedded sessions do not acquire connections")
            }
        };
        let connection = Rc::new(RefCell::new(provider.acquire(mode)?));
        self.connection = Some(Rc::clone(&connection));
        Ok(connection)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if let Err(error) = self.close() {
            info!("ignored error while closing session on drop: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::address_::Address;
    use crate::driver::routing::ClusterComposition;
    use crate::driver::testing::{TestEngine, TestProtocol, TestProvider, TestRediscovery};
    use crate::driver::{AuthToken, Driver, DriverConfig};
    use crate::error_::ErrorKind;
    use crate::value::ValueReceive;
    use crate::value_map;

    fn direct_driver(protocol: Arc<TestProtocol>) -> (Driver, Arc<TestProvider>) {
        let provider = Arc::new(TestProvider::new(protocol));
        let driver = Driver::direct(Arc::clone(&provider) as _, DriverConfig::new());
        (driver, provider)
    }

    fn fast_retry_policy() -> ExponentialBackoff {
        ExponentialBackoff::new()
            .with_initial_delay(Duration::from_millis(1))
            .with_max_retry_time(Duration::from_secs(60))
    }

    #[test]
    fn auto_commit_happy_path() {
        let protocol = TestProtocol::arc();
        protocol.push_auto_commit_result_with_meta(
            &["n"],
            vec![vec![ValueReceive::Integer(1)]],
            vec![("type", ValueReceive::String("r".into()))],
        );
        let (driver, _) = direct_driver(Arc::clone(&protocol));
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let mut cursor = session
            .run("RETURN 1", TransactionConfig::default())
            .unwrap();
        let record = cursor.single().unwrap().unwrap();
        assert_eq!(record.value_at(0), Some(&ValueReceive::Integer(1)));

        let summary = cursor.consume().unwrap();
        assert_eq!(
            summary.statement_type,
            Some(crate::summary::StatementType::ReadOnly)
        );
        assert_eq!(summary.counters, Default::default());
    }

    #[test]
    fn auto_commit_updates_bookmarks_from_stream_meta() {
        let protocol = TestProtocol::arc();
        protocol.push_auto_commit_result_with_meta(
            &["n"],
            vec![],
            vec![("bookmark", ValueReceive::String("bm-77".into()))],
        );
        let (driver, _) = direct_driver(Arc::clone(&protocol));
        let mut session = driver
            .session(
                SessionConfig::new()
                    .with_bookmarks(Bookmarks::from_raw([String::from("bm-initial")])),
            )
            .unwrap();
        assert_eq!(
            session.last_bookmark().unwrap().as_deref(),
            Some("bm-initial")
        );

        let mut cursor = session
            .run("CREATE (n)", TransactionConfig::default())
            .unwrap();
        cursor.consume().unwrap();
        assert_eq!(session.last_bookmark().unwrap().as_deref(), Some("bm-77"));
        // the initial bookmarks were sent along with the statement
        assert_eq!(
            protocol.auto_commit_bookmarks()[0],
            Bookmarks::from_raw([String::from("bm-initial")])
        );
    }

    #[test]
    fn overlap_is_rejected_and_leaves_the_transaction_open() {
        let protocol = TestProtocol::arc();
        let (driver, _) = direct_driver(protocol);
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let tx = session.begin_transaction(TransactionConfig::default()).unwrap();
        let error = session
            .run("RETURN 1", TransactionConfig::default())
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Client);
        assert!(error.message().contains("open transaction"));
        assert!(tx.is_open());

        let error = session
            .begin_transaction(TransactionConfig::default())
            .unwrap_err();
        assert!(error.message().contains("open transaction"));
    }

    #[test]
    fn closed_session_rejects_operations() {
        let protocol = TestProtocol::arc();
        let (driver, _) = direct_driver(protocol);
        let mut session = driver.session(SessionConfig::new()).unwrap();
        session.close().unwrap();
        assert!(!session.is_open());

        let error = session
            .run("RETURN 1", TransactionConfig::default())
            .unwrap_err();
        assert!(error.message().contains("already closed"));
        // close is idempotent
        session.close().unwrap();
    }

    #[test]
    fn unconsumed_cursor_failure_fails_the_next_operation() {
        let protocol = TestProtocol::arc();
        protocol.push_failing_auto_commit_result(ArborError::database("poisoned"));
        protocol.push_auto_commit_result(&["n"], vec![]);
        let (driver, _) = direct_driver(Arc::clone(&protocol));
        let mut session = driver.session(SessionConfig::new()).unwrap();

        // dispatch succeeds, the stream fails lazily and is abandoned
        let _cursor = session
            .run("RETURN boom", TransactionConfig::default())
            .unwrap();
        let error = session
            .run("RETURN 1", TransactionConfig::default())
            .unwrap_err();
        assert_eq!(error.message(), "poisoned");

        // the failure was drained; the next operation proceeds
        let mut cursor = session
            .run("RETURN 1", TransactionConfig::default())
            .unwrap();
        assert!(cursor.next().is_none());
    }

    #[test]
    fn write_transaction_rolls_back_on_user_error() {
        let protocol = TestProtocol::arc();
        let (driver, _) = direct_driver(Arc::clone(&protocol));
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let mut invocations = 0;
        let result: StdResult<i32, _> =
            session.write_transaction(TransactionConfig::default(), |_tx| {
                invocations += 1;
                Err(ArborError::database("x"))
            });
        let Err(RetryError::DriverError(error)) = result else {
            panic!("expected driver error, got {:?}", result);
        };
        assert_eq!(error.message(), "x");
        assert_eq!(invocations, 1);
        assert_eq!(protocol.commits(), 0);
        assert_eq!(protocol.rollbacks(), 1);
    }

    #[test]
    fn retryable_work_is_replayed_until_success() {
        let protocol = TestProtocol::arc();
        let (driver, provider) = direct_driver(Arc::clone(&protocol));
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let mut invocations = 0;
        let result = fast_retry_policy().execute(|| {
            session.execute_work(
                RoutingControl::Write,
                &TransactionConfig::default(),
                &mut |_tx| {
                    invocations += 1;
                    if invocations < 13 {
                        Err(ArborError::session_expired("not a writer anymore"))
                    } else {
                        Ok(42)
                    }
                },
            )
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(invocations, 13);
        assert_eq!(protocol.commits(), 1);
        assert_eq!(protocol.rollbacks(), 12);
        // each attempt acquired a fresh connection
        assert_eq!(provider.acquisitions(), 13);
    }

    #[test]
    fn transaction_work_runs_statements() {
        let protocol = TestProtocol::arc();
        protocol.push_explicit_result(&["x"], vec![vec![ValueReceive::Integer(7)]]);
        let (driver, _) = direct_driver(Arc::clone(&protocol));
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let result: StdResult<i64, _> =
            session.write_transaction(TransactionConfig::default(), |tx| {
                let mut cursor = tx.run(
                    Statement::new("RETURN $x AS x").with_parameters(value_map!({"x": 7})),
                )?;
                let record = cursor.single().expect("exactly one record")?;
                Ok(record.value("x").and_then(ValueReceive::as_int).unwrap())
            });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(protocol.commits(), 1);
    }

    #[test]
    fn reset_terminates_the_open_transaction() {
        let protocol = TestProtocol::arc();
        let (driver, _) = direct_driver(Arc::clone(&protocol));
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let mut tx = session.begin_transaction(TransactionConfig::default()).unwrap();
        session.reset().unwrap();
        let error = tx.commit().unwrap_err();
        assert!(error.message().contains("can't be committed"));
        // a reset went over the wire
        assert_eq!(protocol.resets(), 1);
        // the terminated transaction no longer blocks the session
        session.run("RETURN 1", TransactionConfig::default()).ok();
    }

    #[test]
    fn close_closes_the_open_transaction() {
        let protocol = TestProtocol::arc();
        let (driver, _) = direct_driver(Arc::clone(&protocol));
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let tx = session.begin_transaction(TransactionConfig::default()).unwrap();
        session.close().unwrap();
        assert!(!tx.is_open());
        assert_eq!(protocol.rollbacks(), 1);
    }

    #[test]
    fn successive_statements_reuse_the_session_serially() {
        let protocol = TestProtocol::arc();
        protocol.push_auto_commit_result(&["n"], vec![vec![ValueReceive::Integer(1)]]);
        protocol.push_auto_commit_result(&["n"], vec![vec![ValueReceive::Integer(2)]]);
        let (driver, provider) = direct_driver(Arc::clone(&protocol));
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let mut first = session
            .run("RETURN 1", TransactionConfig::default())
            .unwrap();
        first.consume().unwrap();
        let mut second = session
            .run("RETURN 2", TransactionConfig::default())
            .unwrap();
        let record = second.single().unwrap().unwrap();
        assert_eq!(record.value_at(0), Some(&ValueReceive::Integer(2)));
        assert_eq!(provider.acquisitions(), 2);
    }

    #[test]
    fn embedded_sessions_support_transactions_but_not_auto_commit() {
        let engine = TestEngine::arc();
        engine.push_result(&["n"], vec![vec![ValueReceive::Integer(1)]]);
        let driver = Driver::embedded(
            Arc::clone(&engine) as _,
            &AuthToken::none(),
            DriverConfig::new(),
        )
        .unwrap();
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let error = session
            .run("RETURN 1", TransactionConfig::default())
            .unwrap_err();
        assert!(error.message().contains("unsupported operation"));

        let mut tx = session.begin_transaction(TransactionConfig::default()).unwrap();
        let mut cursor = tx.run("RETURN 1 AS n").unwrap();
        let record = cursor.single().unwrap().unwrap();
        assert_eq!(record.value("n"), Some(&ValueReceive::Integer(1)));
        tx.commit().unwrap();
        assert_eq!(engine.commits(), 1);

        let error = session.last_bookmark().unwrap_err();
        assert!(error.message().contains("bookmarks"));
    }

    #[test]
    fn embedded_transaction_timeout_reaches_the_engine() {
        let engine = TestEngine::arc();
        let driver = Driver::embedded(
            Arc::clone(&engine) as _,
            &AuthToken::none(),
            DriverConfig::new(),
        )
        .unwrap();
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let tx = session
            .begin_transaction(TransactionConfig::new().with_timeout(Duration::from_secs(5)))
            .unwrap();
        drop(tx);
        assert_eq!(engine.begin_timeouts(), vec![Some(Duration::from_secs(5))]);
    }

    #[test]
    fn embedded_driver_validates_auth_and_encryption() {
        let engine = TestEngine::arc();
        let error = Driver::embedded(
            Arc::clone(&engine) as _,
            &AuthToken::new_basic_auth("user", "pass"),
            DriverConfig::new(),
        )
        .unwrap_err();
        assert!(error.message().contains("authentication"));

        let error = Driver::embedded(
            Arc::clone(&engine) as _,
            &AuthToken::none(),
            DriverConfig::new().with_encryption(true),
        )
        .unwrap_err();
        assert!(error.message().contains("encrypt"));

        let error = driver_with_bookmarks_error(engine);
        assert!(error.message().contains("bookmarks"));
    }

    fn driver_with_bookmarks_error(engine: Arc<TestEngine>) -> ArborError {
        let driver = Driver::embedded(engine as _, &AuthToken::none(), DriverConfig::new())
            .expect("embedded driver with none auth");
        driver
            .session(
                SessionConfig::new().with_bookmarks(Bookmarks::from_raw([String::from("bm")])),
            )
            .unwrap_err()
    }

    #[test]
    fn routing_sessions_refresh_the_table_before_acquiring() {
        let protocol = TestProtocol::arc();
        protocol.push_auto_commit_result(&["n"], vec![]);
        let provider = Arc::new(TestProvider::new(Arc::clone(&protocol)));
        let rediscovery = TestRediscovery::arc(ClusterComposition {
            routers: vec![Arc::new(Address::new("router1", 7687))],
            readers: vec![Arc::new(Address::new("reader1", 7687))],
            writers: vec![Arc::new(Address::new("writer1", 7687))],
            expires_after: Duration::from_secs(300),
        });
        let driver = Driver::routing(
            Arc::clone(&provider) as _,
            Arc::clone(&rediscovery) as _,
            Address::new("router1", 7687),
            DriverConfig::new(),
        );
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let mut cursor = session
            .run("RETURN 1", TransactionConfig::default())
            .unwrap();
        assert!(cursor.next().is_none());
        assert_eq!(rediscovery.lookups(), 1);
        assert_eq!(provider.retained().len(), 1);

        // the second statement finds the table fresh
        session
            .run("RETURN 1", TransactionConfig::default())
            .unwrap();
        assert_eq!(rediscovery.lookups(), 1);
        assert_eq!(provider.acquisitions(), 2);
    }

    #[test]
    fn begin_failure_releases_the_connection_and_recovers() {
        let protocol = TestProtocol::arc();
        protocol.push_begin_result(Err(ArborError::service_unavailable("no writer")));
        let (driver, provider) = direct_driver(Arc::clone(&protocol));
        let mut session = driver.session(SessionConfig::new()).unwrap();

        let error = session
            .begin_transaction(TransactionConfig::default())
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ServiceUnavailable);

        // the failed begin did not leave a poisoned reference behind
        let tx = session.begin_transaction(TransactionConfig::default()).unwrap();
        assert!(tx.is_open());
        assert_eq!(protocol.begins(), 2);
        assert_eq!(provider.acquisitions(), 2);
    }
}
