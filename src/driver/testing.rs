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

//! Scripted stand-ins for the [`spi`](crate::driver::spi) capabilities.
//!
//! These fakes record every interaction so tests can assert on acquisition,
//! release, commit, and rediscovery counts.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use parking_lot::Mutex;

use super::record::Record;
use super::routing::{ClusterComposition, RoutingTable};
use super::session::bookmarks::Bookmarks;
use super::session::Statement;
use super::spi::{
    Connection, ConnectionProvider, CypherRunner, EngineTransaction, Protocol, Rediscovery,
    RecordSource, SourceMeta,
};
use super::transaction::TransactionConfig;
use super::RoutingControl;
use crate::address_::Address;
use crate::error_::{ArborError, Result};
use crate::value::ValueReceive;

/// A [`RecordSource`] over a fixed list of records.
#[derive(Debug, Default)]
pub(crate) struct TestRecordSource {
    keys: Vec<Arc<String>>,
    records: VecDeque<Record>,
    meta: SourceMeta,
    fail_after: Option<(usize, ArborError)>,
    emitted: usize,
}

impl TestRecordSource {
    pub(crate) fn new(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(|k| Arc::new(String::from(*k))).collect(),
            ..Default::default()
        }
    }

    pub(crate) fn push_record(&mut self, values: Vec<ValueReceive>) {
        self.records.push_back(Record::new(&self.keys, values));
    }

    pub(crate) fn set_meta(&mut self, key: &str, value: ValueReceive) {
        self.meta.insert(String::from(key), value);
    }

    /// Fail the stream after `emitted` records have been handed out.
    pub(crate) fn fail_after(&mut self, emitted: usize, error: ArborError) {
        self.fail_after = Some((emitted, error));
    }
}

impl RecordSource for TestRecordSource {
    fn keys(&self) -> Vec<Arc<String>> {
        self.keys.clone()
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        if let Some((after, error)) = &self.fail_after {
            if self.emitted >= *after {
                return Err(error.clone());
            }
        }
        self.emitted += 1;
        Ok(self.records.pop_front())
    }

    fn finish(&mut self) -> Result<SourceMeta> {
        self.records.clear();
        Ok(std::mem::take(&mut self.meta))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionEvent {
    Released,
    Reset,
    Terminated,
}

#[derive(Debug, Default)]
struct ProtocolScript {
    begin_results: VecDeque<Result<()>>,
    auto_commit_results: VecDeque<Result<TestRecordSource>>,
    explicit_results: VecDeque<Result<TestRecordSource>>,
    commit_results: VecDeque<Result<Bookmarks>>,
    rollback_results: VecDeque<Result<()>>,
    begins: usize,
    commits: usize,
    rollbacks: usize,
    auto_commit_bookmarks: Vec<Bookmarks>,
    connection_events: Vec<ConnectionEvent>,
}

/// A scripted [`Protocol`].
///
/// Results for each operation are queued with the `push_*` methods; when the
/// queue is empty, a benign default is used (successful begin/rollback, an
/// empty record stream, a commit returning the bookmark `bm-commit`).
#[derive(Debug, Default)]
pub(crate) struct TestProtocol {
    script: Mutex<ProtocolScript>,
}

impl TestProtocol {
    pub(crate) fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_begin_result(&self, result: Result<()>) {
        self.script.lock().begin_results.push_back(result);
    }

    pub(crate) fn push_commit_result(&self, result: Result<Bookmarks>) {
        self.script.lock().commit_results.push_back(result);
    }

    pub(crate) fn push_auto_commit_result(&self, keys: &[&str], rows: Vec<Vec<ValueReceive>>) {
        self.push_auto_commit_result_with_meta(keys, rows, vec![]);
    }

    pub(crate) fn push_auto_commit_result_with_meta(
        &self,
        keys: &[&str],
        rows: Vec<Vec<ValueReceive>>,
        meta: Vec<(&str, ValueReceive)>,
    ) {
        let source = Self::source(keys, rows, meta);
        self.script.lock().auto_commit_results.push_back(Ok(source));
    }

    pub(crate) fn push_failing_auto_commit_result(&self, error: ArborError) {
        let mut source = TestRecordSource::new(&[]);
        source.fail_after(0, error);
        self.script.lock().auto_commit_results.push_back(Ok(source));
    }

    pub(crate) fn push_explicit_result(&self, keys: &[&str], rows: Vec<Vec<ValueReceive>>) {
        let source = Self::source(keys, rows, vec![]);
        self.script.lock().explicit_results.push_back(Ok(source));
    }

    pub(crate) fn push_failing_explicit_result(&self, error: ArborError) {
        let mut source = TestRecordSource::new(&[]);
        source.fail_after(0, error);
        self.script.lock().explicit_results.push_back(Ok(source));
    }

    pub(crate) fn begins(&self) -> usize {
        self.script.lock().begins
    }

    pub(crate) fn commits(&self) -> usize {
        self.script.lock().commits
    }

    pub(crate) fn rollbacks(&self) -> usize {
        self.script.lock().rollbacks
    }

    pub(crate) fn resets(&self) -> usize {
        self.script
            .lock()
            .connection_events
            .iter()
            .filter(|event| **event == ConnectionEvent::Reset)
            .count()
    }

    /// The bookmarks sent with each auto-commit statement, in order.
    pub(crate) fn auto_commit_bookmarks(&self) -> Vec<Bookmarks> {
        self.script.lock().auto_commit_bookmarks.clone()
    }

    fn source(
        keys: &[&str],
        rows: Vec<Vec<ValueReceive>>,
        meta: Vec<(&str, ValueReceive)>,
    ) -> TestRecordSource {
        let mut source = TestRecordSource::new(keys);
        for row in rows {
            source.push_record(row);
        }
        for (key, value) in meta {
            source.set_meta(key, value);
        }
        source
    }

    fn record_connection_event(&self, event: ConnectionEvent) {
        self.script.lock().connection_events.push(event);
    }
}

pub(crate) fn connection_events(protocol: &Arc<TestProtocol>) -> Vec<ConnectionEvent> {
    protocol.script.lock().connection_events.clone()
}

impl Protocol for TestProtocol {
    fn begin_transaction(
        &self,
        _connection: &mut dyn Connection,
        _bookmarks: &Bookmarks,
        _config: &TransactionConfig,
    ) -> Result<()> {
        let mut script = self.script.lock();
        script.begins += 1;
        script.begin_results.pop_front().unwrap_or(Ok(()))
    }

    fn run_in_auto_commit_transaction(
        &self,
        _connection: &mut dyn Connection,
        _statement: &Statement,
        bookmarks: &Bookmarks,
        _config: &TransactionConfig,
        _wait_for_run_response: bool,
    ) -> Result<Box<dyn RecordSource>> {
        let mut script = self.script.lock();
        script.auto_commit_bookmarks.push(bookmarks.clone());
        let source = script
            .auto_commit_results
            .pop_front()
            .unwrap_or_else(|| Ok(TestRecordSource::new(&[])))?;
        Ok(Box::new(source))
    }

    fn run_in_explicit_transaction(
        &self,
        _connection: &mut dyn Connection,
        _statement: &Statement,
        _wait_for_run_response: bool,
    ) -> Result<Box<dyn RecordSource>> {
        let source = self
            .script
            .lock()
            .explicit_results
            .pop_front()
            .unwrap_or_else(|| Ok(TestRecordSource::new(&[])))?;
        Ok(Box::new(source))
    }

    fn commit_transaction(&self, _connection: &mut dyn Connection) -> Result<Bookmarks> {
        let mut script = self.script.lock();
        script.commits += 1;
        script
            .commit_results
            .pop_front()
            .unwrap_or_else(|| Ok(Bookmarks::from_raw([String::from("bm-commit")])))
    }

    fn rollback_transaction(&self, _connection: &mut dyn Connection) -> Result<()> {
        let mut script = self.script.lock();
        script.rollbacks += 1;
        script.rollback_results.pop_front().unwrap_or(Ok(()))
    }
}

/// A [`Connection`] that reports its lifecycle events into the protocol's
/// script for later inspection.
#[derive(Debug)]
pub(crate) struct TestConnection {
    protocol: Arc<TestProtocol>,
    open: bool,
}

impl TestConnection {
    pub(crate) fn new(protocol: Arc<TestProtocol>) -> Self {
        Self {
            protocol,
            open: true,
        }
    }
}

impl Connection for TestConnection {
    fn protocol(&self) -> Arc<dyn Protocol> {
        Arc::clone(&self.protocol) as _
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn reset(&mut self) -> Result<()> {
        self.protocol.record_connection_event(ConnectionEvent::Reset);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.protocol
                .record_connection_event(ConnectionEvent::Released);
        }
        Ok(())
    }

    fn terminate_and_release(&mut self, _reason: &str) {
        self.open = false;
        self.protocol
            .record_connection_event(ConnectionEvent::Terminated);
    }
}

/// A [`ConnectionProvider`] handing out [`TestConnection`]s and recording
/// `retain_all` calls.
#[derive(Debug)]
pub(crate) struct TestProvider {
    protocol: Arc<TestProtocol>,
    acquisitions: AtomicUsize,
    acquire_failures: Mutex<VecDeque<ArborError>>,
    retained: Mutex<Vec<HashSet<Arc<Address>>>>,
}

impl TestProvider {
    pub(crate) fn new(protocol: Arc<TestProtocol>) -> Self {
        Self {
            protocol,
            acquisitions: AtomicUsize::new(0),
            acquire_failures: Mutex::new(VecDeque::new()),
            retained: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub(crate) fn retained(&self) -> Vec<HashSet<Arc<Address>>> {
        self.retained.lock().clone()
    }

    #[allow(dead_code)]
    pub(crate) fn fail_next_acquire(&self, error: ArborError) {
        self.acquire_failures.lock().push_back(error);
    }
}

impl ConnectionProvider for TestProvider {
    fn acquire(&self, _mode: RoutingControl) -> Result<Box<dyn Connection>> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.acquire_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(Box::new(TestConnection::new(Arc::clone(&self.protocol))))
    }

    fn retain_all(&self, addresses: &HashSet<Arc<Address>>) -> Result<()> {
        self.retained.lock().push(addresses.clone());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A [`Rediscovery`] returning a fixed composition, with optional scripted
/// failures and an artificial delay for coalescing tests.
#[derive(Debug)]
pub(crate) struct TestRediscovery {
    composition: Mutex<ClusterComposition>,
    failures: Mutex<VecDeque<ArborError>>,
    delay: Mutex<Option<Duration>>,
    lookups: AtomicUsize,
}

impl TestRediscovery {
    pub(crate) fn arc(composition: ClusterComposition) -> Arc<Self> {
        Arc::new(Self {
            composition: Mutex::new(composition),
            failures: Mutex::new(VecDeque::new()),
            delay: Mutex::new(None),
            lookups: AtomicUsize::new(0),
        })
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub(crate) fn fail_next(&self, error: ArborError) {
        self.failures.lock().push_back(error);
    }

    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Rediscovery for TestRediscovery {
    fn lookup_cluster_composition(
        &self,
        _table: &RoutingTable,
        _provider: &dyn ConnectionProvider,
    ) -> Result<ClusterComposition> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = *self.delay.lock() {
            sleep(delay);
        }
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.composition.lock().clone())
    }
}

#[derive(Debug, Default)]
struct EngineState {
    results: VecDeque<TestRecordSource>,
    begin_timeouts: Vec<Option<Duration>>,
    commits: usize,
    rollbacks: usize,
}

/// A [`CypherRunner`] with scripted results and transaction accounting.
#[derive(Debug, Default)]
pub(crate) struct TestEngine {
    state: Arc<Mutex<EngineState>>,
}

impl TestEngine {
    pub(crate) fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_result(&self, keys: &[&str], rows: Vec<Vec<ValueReceive>>) {
        let mut source = TestRecordSource::new(keys);
        for row in rows {
            source.push_record(row);
        }
        self.state.lock().results.push_back(source);
    }

    pub(crate) fn commits(&self) -> usize {
        self.state.lock().commits
    }

    #[allow(dead_code)]
    pub(crate) fn rollbacks(&self) -> usize {
        self.state.lock().rollbacks
    }

    pub(crate) fn begin_timeouts(&self) -> Vec<Option<Duration>> {
        self.state.lock().begin_timeouts.clone()
    }
}

impl CypherRunner for TestEngine {
    fn execute(&self, _statement: &Statement) -> Result<Box<dyn RecordSource>> {
        let source = self
            .state
            .lock()
            .results
            .pop_front()
            .unwrap_or_else(|| TestRecordSource::new(&[]));
        Ok(Box::new(source))
    }

    fn begin_transaction(&self, timeout: Option<Duration>) -> Result<Box<dyn EngineTransaction>> {
        let mut state = self.state.lock();
        state.begin_timeouts.push(timeout);
        Ok(Box::new(TestEngineTransaction {
            state: Arc::clone(&self.state),
            finished: false,
        }))
    }
}

#[derive(Debug)]
struct TestEngineTransaction {
    state: Arc<Mutex<EngineState>>,
    finished: bool,
}

impl EngineTransaction for TestEngineTransaction {
    fn commit(&mut self) -> Result<()> {
        assert!(!self.finished, "engine transaction finished twice");
        self.finished = true;
        self.state.lock().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        assert!(!self.finished, "engine transaction finished twice");
        self.finished = true;
        self.state.lock().rollbacks += 1;
        Ok(())
    }
}
