use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, watch};

use crate::connection::{Connection, ConnectionStatus, StatementOutcome, StatusSignal};
use crate::error::{TxError, TxResult};
use crate::results::ResultSet;
use crate::types::{RowValues, StatementHandle, StatementKind};

/// One call made on a [`MemoryConnection`], tagged with the connection id.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect(u64),
    Begin(u64),
    Commit(u64),
    Rollback(u64),
    Prepare(u64, String),
    Execute(u64, String, Vec<RowValues>),
    Destroy(u64, String),
    Close(u64),
}

#[derive(Default)]
struct Failures {
    connect: Option<String>,
    begin: Option<String>,
    commit: Option<String>,
    rollback: Option<String>,
}

#[derive(Default)]
struct BackendState {
    responses: HashMap<String, Result<StatementOutcome, String>>,
    failures: Failures,
    journal: Vec<Call>,
    live: Vec<(u64, Weak<StatusSignal>)>,
    next_connection: u64,
    next_insert_id: i64,
}

/// Scripted stand-in for a database server.
///
/// Statement results are keyed by SQL text. Unscripted statements succeed with a default by
/// kind: empty rows for selects, increasing ids (from 1) for inserts, one affected row otherwise.
/// Every call is appended to a journal that tests can inspect.
///
/// ```rust
/// use sql_transactional::prelude::*;
/// use sql_transactional::test_utils::MemoryBackend;
///
/// let backend = MemoryBackend::new();
/// backend.respond_rows("SELECT * FROM users WHERE id=?", &["id", "name"], vec![
///     vec![RowValues::Int(1), RowValues::from("alice")],
/// ]);
/// backend.fail_commit("disk full");
/// ```
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: Call) {
        self.state().journal.push(call);
    }

    /// Open a new connection to this backend. Ids start at 1.
    #[must_use]
    pub fn connection(&self) -> MemoryConnection {
        let status = Arc::new(StatusSignal::new());
        let id = {
            let mut state = self.state();
            state.next_connection += 1;
            let id = state.next_connection;
            state.live.retain(|(_, signal)| signal.strong_count() > 0);
            state.live.push((id, Arc::downgrade(&status)));
            id
        };
        MemoryConnection {
            id,
            backend: self.clone(),
            status,
            statements: HashSet::new(),
            next_statement: 1,
            _permit: None,
        }
    }

    /// Script the outcome of executing `sql`.
    pub fn respond(&self, sql: impl Into<String>, outcome: StatementOutcome) {
        self.state().responses.insert(sql.into(), Ok(outcome));
    }

    /// Script rows for `sql`.
    pub fn respond_rows(&self, sql: impl Into<String>, columns: &[&str], rows: Vec<Vec<RowValues>>) {
        let columns = columns.iter().map(|c| (*c).to_string()).collect();
        self.respond(sql, StatementOutcome::Rows(ResultSet::from_rows(columns, rows)));
    }

    /// Make every execution of `sql` fail with `TxError::ExecutionError(message)`.
    pub fn fail_execute(&self, sql: impl Into<String>, message: impl Into<String>) {
        self.state().responses.insert(sql.into(), Err(message.into()));
    }

    pub fn fail_connect(&self, message: impl Into<String>) {
        self.state().failures.connect = Some(message.into());
    }

    pub fn fail_begin(&self, message: impl Into<String>) {
        self.state().failures.begin = Some(message.into());
    }

    pub fn fail_commit(&self, message: impl Into<String>) {
        self.state().failures.commit = Some(message.into());
    }

    pub fn fail_rollback(&self, message: impl Into<String>) {
        self.state().failures.rollback = Some(message.into());
    }

    /// Remove every injected failure; scripted responses stay.
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failures = Failures::default();
        state.responses.retain(|_, response| response.is_ok());
    }

    /// End connection `id` as if the server dropped it.
    pub fn terminate(&self, id: u64) {
        let signal = self
            .state()
            .live
            .iter()
            .find(|(live_id, _)| *live_id == id)
            .and_then(|(_, signal)| signal.upgrade());
        if let Some(signal) = signal {
            signal.finish(ConnectionStatus::Failed);
        }
    }

    /// End every open connection.
    pub fn terminate_all(&self) {
        let signals: Vec<_> = self
            .state()
            .live
            .iter()
            .filter_map(|(_, signal)| signal.upgrade())
            .collect();
        for signal in signals {
            signal.finish(ConnectionStatus::Failed);
        }
    }

    #[must_use]
    pub fn journal(&self) -> Vec<Call> {
        self.state().journal.clone()
    }

    fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state().journal.iter().filter(|call| matches(call)).count()
    }

    #[must_use]
    pub fn begins(&self) -> usize {
        self.count(|call| matches!(call, Call::Begin(_)))
    }

    #[must_use]
    pub fn commits(&self) -> usize {
        self.count(|call| matches!(call, Call::Commit(_)))
    }

    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.count(|call| matches!(call, Call::Rollback(_)))
    }

    /// Executed statements with their bindings, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<(String, Vec<RowValues>)> {
        self.state()
            .journal
            .iter()
            .filter_map(|call| match call {
                Call::Execute(_, sql, bindings) => Some((sql.clone(), bindings.clone())),
                _ => None,
            })
            .collect()
    }

    fn outcome(&self, sql: &str, kind: StatementKind) -> TxResult<StatementOutcome> {
        let mut state = self.state();
        let scripted = state.responses.get(sql).cloned();
        match scripted {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(TxError::ExecutionError(message)),
            None => Ok(match kind {
                StatementKind::Select => StatementOutcome::Rows(ResultSet::default()),
                StatementKind::Insert => {
                    state.next_insert_id += 1;
                    StatementOutcome::Inserted(state.next_insert_id)
                }
                StatementKind::Update | StatementKind::Delete | StatementKind::Other => {
                    StatementOutcome::Affected(1)
                }
            }),
        }
    }

    fn injected(&self, pick: impl Fn(&Failures) -> &Option<String>) -> TxResult<()> {
        match pick(&self.state().failures) {
            Some(message) => Err(TxError::ConnectionError(message.clone())),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("MemoryBackend")
            .field("connections", &state.next_connection)
            .field("journal", &state.journal.len())
            .finish_non_exhaustive()
    }
}

/// A connection to a [`MemoryBackend`].
pub struct MemoryConnection {
    id: u64,
    backend: MemoryBackend,
    status: Arc<StatusSignal>,
    statements: HashSet<u64>,
    next_statement: u64,
    _permit: Option<OwnedSemaphorePermit>,
}

impl MemoryConnection {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Hold a pool permit for as long as the connection lives.
    pub(crate) fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }

    fn ensure_open(&self) -> TxResult<()> {
        if self.status.current().is_terminal() {
            Err(TxError::ConnectionError(format!(
                "memory connection {} has ended",
                self.id
            )))
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("id", &self.id)
            .field("status", &self.status.current())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn connect(&mut self) -> TxResult<()> {
        self.backend.record(Call::Connect(self.id));
        self.ensure_open()?;
        self.backend.injected(|f| &f.connect)
    }

    async fn begin_transaction(&mut self) -> TxResult<()> {
        self.backend.record(Call::Begin(self.id));
        self.ensure_open()?;
        self.backend.injected(|f| &f.begin)
    }

    async fn commit(&mut self) -> TxResult<()> {
        self.backend.record(Call::Commit(self.id));
        self.ensure_open()?;
        self.backend.injected(|f| &f.commit)
    }

    async fn rollback(&mut self) -> TxResult<()> {
        self.backend.record(Call::Rollback(self.id));
        self.ensure_open()?;
        self.backend.injected(|f| &f.rollback)
    }

    async fn prepare(&mut self, sql: &str, kind: StatementKind) -> TxResult<StatementHandle> {
        self.backend.record(Call::Prepare(self.id, sql.to_string()));
        self.ensure_open()?;
        let handle = StatementHandle::new(self.next_statement, sql, kind);
        self.next_statement += 1;
        self.statements.insert(handle.id());
        Ok(handle)
    }

    async fn execute(
        &mut self,
        statement: &StatementHandle,
        bindings: &[RowValues],
    ) -> TxResult<StatementOutcome> {
        self.backend.record(Call::Execute(
            self.id,
            statement.sql().to_string(),
            bindings.to_vec(),
        ));
        self.ensure_open()?;
        if !self.statements.contains(&statement.id()) {
            return Err(TxError::ExecutionError(format!(
                "statement {} is not prepared on connection {}",
                statement.id(),
                self.id
            )));
        }
        self.backend.outcome(statement.sql(), statement.kind())
    }

    fn destroy(&mut self, statement: &StatementHandle) {
        if self.statements.remove(&statement.id()) {
            self.backend
                .record(Call::Destroy(self.id, statement.sql().to_string()));
        }
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    async fn close(&mut self) {
        self.backend.record(Call::Close(self.id));
        self.statements.clear();
        self.status.finish(ConnectionStatus::Closed);
    }
}
