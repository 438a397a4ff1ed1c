use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use sql_transactional::prelude::*;
use sql_transactional::test_utils::{Call, MemoryBackend, MemoryDriver, RecordingSink};

struct Harness {
    manager: ConnectionManager,
    driver: Arc<MemoryDriver>,
    backend: MemoryBackend,
    sink: RecordingSink,
}

impl Harness {
    fn new() -> Self {
        let backend = MemoryBackend::new();
        let driver = Arc::new(MemoryDriver::new(backend.clone(), 2));
        Self {
            manager: ConnectionManager::new(driver.clone()),
            driver,
            backend,
            sink: RecordingSink::new(),
        }
    }

    async fn run(&self, program: Transaction) -> TxResult<TxValue> {
        self.manager.run_transaction(program, &self.sink).await
    }

    fn assert_released(&self) {
        assert_eq!(self.driver.acquired(), self.driver.released());
        assert_eq!(self.driver.available(), 2);
    }
}

fn create_user(name: &str) -> Transaction {
    Transaction::insert("users", Record::new().with("name", name)).and_then(|id| {
        Transaction::emit("user_created", json!({ "id": id.as_id() })).map(move |_| id)
    })
}

#[tokio::test]
async fn success_commits_then_publishes_events_in_order() {
    let h = Harness::new();
    let program = create_user("a")
        .then(create_user("b"))
        .and_then(|id| Transaction::emit("done", json!(null)).map(move |_| id));

    let value = h.run(program).await.unwrap();

    assert_eq!(value, TxValue::Id(2));
    assert_eq!(h.backend.begins(), 1);
    assert_eq!(h.backend.commits(), 1);
    assert_eq!(h.backend.rollbacks(), 0);
    assert_eq!(
        h.sink.event_types(),
        vec!["user_created", "user_created", "done"]
    );
    assert_eq!(h.sink.events()[1].payload, json!({ "id": 2 }));
    h.assert_released();
}

#[tokio::test]
async fn events_are_published_after_commit_and_release() {
    let backend = MemoryBackend::new();
    let driver = Arc::new(MemoryDriver::new(backend.clone(), 1));
    let manager = ConnectionManager::new(driver.clone());
    let published = Arc::new(AtomicUsize::new(0));

    let sink = {
        let backend = backend.clone();
        let driver = driver.clone();
        let published = published.clone();
        move |event_type: &str, _payload: &serde_json::Value| {
            assert_eq!(event_type, "user_created");
            assert_eq!(backend.commits(), 1);
            assert_eq!(driver.released(), 1);
            published.fetch_add(1, Ordering::SeqCst);
        }
    };
    manager.run_transaction(create_user("a"), &sink).await.unwrap();

    assert_eq!(published.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn insert_yields_the_id_the_driver_reports() {
    let h = Harness::new();
    h.backend.respond(
        "INSERT INTO users(name) VALUES(?)",
        StatementOutcome::Inserted(7),
    );

    let value = h
        .run(Transaction::insert("users", Record::new().with("name", "x")))
        .await
        .unwrap();

    assert_eq!(value, TxValue::Id(7));
    assert_eq!(h.backend.commits(), 1);
}

#[tokio::test]
async fn every_statement_runs_between_begin_and_commit_on_one_connection() {
    let h = Harness::new();
    h.run(create_user("a").then(Transaction::delete("users", 1)))
        .await
        .unwrap();

    let journal = h.backend.journal();
    assert_eq!(journal.first(), Some(&Call::Connect(1)));
    assert_eq!(journal.get(1), Some(&Call::Begin(1)));
    assert_eq!(journal.last(), Some(&Call::Commit(1)));
    let prepares = journal
        .iter()
        .filter(|c| matches!(c, Call::Prepare(1, _)))
        .count();
    let destroys = journal
        .iter()
        .filter(|c| matches!(c, Call::Destroy(1, _)))
        .count();
    assert_eq!(prepares, 2);
    assert_eq!(destroys, 2);
}

#[tokio::test]
async fn failure_rolls_back_and_drops_events() {
    let h = Harness::new();
    let program = create_user("a").then(Transaction::abort("changed my mind"));

    let err = h.run(program).await.unwrap_err();

    assert!(matches!(err, TxError::Aborted(_)));
    assert_eq!(h.backend.commits(), 0);
    assert_eq!(h.backend.rollbacks(), 1);
    assert!(h.sink.events().is_empty());
    h.assert_released();
}

#[tokio::test]
async fn statement_errors_stop_the_program() {
    let h = Harness::new();
    h.backend
        .fail_execute("INSERT INTO users(name) VALUES(?)", "constraint violated");
    let program = create_user("a").then(Transaction::delete("users", 1));

    let err = h.run(program).await.unwrap_err();

    assert!(matches!(err, TxError::ExecutionError(ref m) if m == "constraint violated"));
    assert!(
        !h.backend
            .executed()
            .iter()
            .any(|(sql, _)| sql.starts_with("DELETE"))
    );
    // The failed statement is still destroyed.
    assert!(
        h.backend
            .journal()
            .iter()
            .any(|c| matches!(c, Call::Destroy(_, sql) if sql.starts_with("INSERT")))
    );
    assert_eq!(h.backend.rollbacks(), 1);
    h.assert_released();
}

#[tokio::test]
async fn rollback_failure_does_not_mask_the_original_error() {
    let h = Harness::new();
    h.backend.fail_rollback("connection reset");
    let err = h.run(Transaction::abort("original")).await.unwrap_err();

    assert!(matches!(err, TxError::Aborted(ref m) if m == "original"));
    // Releasing the connection tries the rollback once more.
    assert_eq!(h.backend.rollbacks(), 2);
    h.assert_released();
}

#[tokio::test]
async fn commit_failure_rolls_back_and_publishes_nothing() {
    let h = Harness::new();
    h.backend.fail_commit("disk full");

    let err = h.run(create_user("a")).await.unwrap_err();

    assert!(matches!(err, TxError::ConnectionError(ref m) if m == "disk full"));
    assert_eq!(h.backend.commits(), 1);
    assert_eq!(h.backend.rollbacks(), 1);
    assert!(h.sink.events().is_empty());
    h.assert_released();
}

#[tokio::test]
async fn begin_failure_releases_without_running() {
    let h = Harness::new();
    h.backend.fail_begin("read only");

    let err = h.run(create_user("a")).await.unwrap_err();

    assert!(matches!(err, TxError::ConnectionError(_)));
    assert!(h.backend.executed().is_empty());
    assert_eq!(h.backend.rollbacks(), 0);
    h.assert_released();
}

#[tokio::test]
async fn lifted_values_flow_into_continuations() {
    let h = Harness::new();
    let program = Transaction::lift_async(async { Ok(TxValue::Value(RowValues::from("carol"))) })
        .and_then(|name| match name {
            TxValue::Value(name) => Transaction::insert("users", Record::new().with("name", name)),
            other => Transaction::fail(TxError::UnexpectedValue(format!("{other:?}"))),
        });

    assert_eq!(h.run(program).await.unwrap(), TxValue::Id(1));
    assert_eq!(
        h.backend.executed()[0].1,
        vec![RowValues::from("carol")]
    );
}

#[tokio::test]
async fn lifted_rejection_rolls_back() {
    let h = Harness::new();
    let program = create_user("a")
        .then(Transaction::lift_fallible(async { Err::<(), _>("upstream said no") }));

    let err = h.run(program).await.unwrap_err();

    assert!(matches!(err, TxError::AsyncFailure(ref m) if m == "upstream said no"));
    assert_eq!(h.backend.rollbacks(), 1);
    assert!(h.sink.events().is_empty());
    h.assert_released();
}

#[tokio::test]
async fn deadline_rolls_back_and_releases() {
    let backend = MemoryBackend::new();
    let driver = Arc::new(MemoryDriver::new(backend.clone(), 1));
    let manager = ConnectionManager::new(driver.clone())
        .with_transaction_timeout(Duration::from_millis(20));
    let program = create_user("a").then(Transaction::lift_async(async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(TxValue::Unit)
    }));

    let err = manager.run(program).await.unwrap_err();

    assert!(matches!(err, TxError::Timeout(d) if d == Duration::from_millis(20)));
    assert_eq!(backend.rollbacks(), 1);
    assert_eq!(backend.commits(), 0);
    assert_eq!(driver.released(), 1);
    assert_eq!(driver.available(), 1);
}

#[tokio::test]
async fn read_produces_a_record_or_nothing() {
    let h = Harness::new();
    h.backend.respond_rows(
        "SELECT * FROM users WHERE id=?",
        &["id", "name"],
        vec![vec![RowValues::Int(1), RowValues::from("alice")]],
    );

    let found = h.run(Transaction::read("users", 1)).await.unwrap();
    let record = found.into_record().unwrap().unwrap();
    assert_eq!(record.get("name"), Some(&RowValues::from("alice")));

    h.backend.respond_rows("SELECT * FROM users WHERE id=?", &["id", "name"], vec![]);
    let missing = h.run(Transaction::read("users", 2)).await.unwrap();
    assert!(missing.is_nothing());
}

#[tokio::test]
async fn prepared_statements_can_be_executed_repeatedly() {
    let h = Harness::new();
    let program = Transaction::prepare(StatementKind::Insert, "INSERT INTO tags(name) VALUES(?)")
        .and_then(|stmt| {
            let stmt = match stmt.into_statement() {
                Ok(stmt) => stmt,
                Err(err) => return Transaction::fail(err),
            };
            Transaction::execute(stmt.clone(), vec![RowValues::from("x")])
                .then(Transaction::execute(stmt, vec![RowValues::from("y")]))
        });

    assert_eq!(h.run(program).await.unwrap(), TxValue::Id(2));
    assert_eq!(h.backend.executed().len(), 2);
}

#[tokio::test]
async fn query_results_follow_the_statement_kind() {
    let h = Harness::new();
    h.backend
        .respond("UPDATE users SET active=0", StatementOutcome::Affected(3));

    let affected = h
        .run(Transaction::query(
            StatementKind::Update,
            "UPDATE users SET active=0",
            vec![],
        ))
        .await
        .unwrap();
    assert_eq!(affected.as_affected(), Some(3));

    let rows = h
        .run(Transaction::query(StatementKind::Select, "SELECT 1", vec![]))
        .await
        .unwrap();
    assert!(rows.as_rows().is_some_and(ResultSet::is_empty));
}

#[tokio::test]
async fn closed_manager_refuses_work() {
    let h = Harness::new();
    h.manager.close().await;

    let err = h.run(create_user("a")).await.unwrap_err();
    assert!(matches!(err, TxError::PoolError(_)));
    assert!(matches!(
        h.manager.get_connection().await,
        Err(TxError::PoolError(_))
    ));
    assert_eq!(h.driver.acquired(), 0);
}
