use std::sync::Arc;

use serde_json::json;
use sql_transactional::prelude::*;
use sql_transactional::test_utils::{MemoryBackend, MemoryDriver, RecordingSink};

fn manager() -> (ConnectionManager, MemoryBackend) {
    let backend = MemoryBackend::new();
    let driver = Arc::new(MemoryDriver::new(backend.clone(), 4));
    (ConnectionManager::new(driver), backend)
}

fn user(name: &str) -> Record {
    Record::new().with("name", name)
}

fn rename(value: TxValue) -> Transaction {
    let id = value.as_id().unwrap_or_default();
    Transaction::update("users", Record::new().with("id", id).with("name", "renamed"))
        .map(move |_| value)
}

fn scale(value: TxValue) -> Transaction {
    let id = value.as_id().unwrap_or_default();
    Transaction::query(
        StatementKind::Select,
        "SELECT * FROM audit WHERE user_id=?",
        vec![RowValues::Int(id)],
    )
    .map(move |_| TxValue::Value(RowValues::Int(id * 10)))
}

#[tokio::test]
async fn bind_is_associative() {
    let (left_manager, left_backend) = manager();
    let left = Transaction::insert("users", user("a"))
        .and_then(rename)
        .and_then(scale);
    let left_value = left_manager.run(left).await.unwrap();

    let (right_manager, right_backend) = manager();
    let right = Transaction::insert("users", user("a")).and_then(|v| rename(v).and_then(scale));
    let right_value = right_manager.run(right).await.unwrap();

    assert_eq!(left_value, TxValue::Value(RowValues::Int(10)));
    assert_eq!(left_value, right_value);
    assert_eq!(left_backend.executed(), right_backend.executed());
}

#[tokio::test]
async fn unit_is_a_left_identity() {
    let (m1, b1) = manager();
    let (m2, b2) = manager();
    let a = m1
        .run(Transaction::unit(TxValue::Id(3)).and_then(rename))
        .await
        .unwrap();
    let b = m2.run(rename(TxValue::Id(3))).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(b1.executed(), b2.executed());
}

#[tokio::test]
async fn top_level_skip_ends_the_run_and_commits() {
    let (manager, backend) = manager();
    let sink = RecordingSink::new();
    let program = Transaction::emit("started", json!({}))
        .then(Transaction::skip(TxValue::Value(RowValues::Int(7))))
        .then(Transaction::insert("users", user("never")));

    let value = manager.run_transaction(program, &sink).await.unwrap();

    assert_eq!(value, TxValue::Value(RowValues::Int(7)));
    assert!(backend.executed().is_empty());
    assert_eq!(backend.commits(), 1);
    assert_eq!(backend.rollbacks(), 0);
    assert_eq!(sink.event_types(), vec!["started"]);
}

#[tokio::test]
async fn skip_inside_continue_resumes_the_outer_program() {
    let (manager, backend) = manager();
    let lookup = Transaction::read("users", 1)
        .maybe_skip()
        .then(Transaction::insert("audit", user("found")));
    let program = Transaction::continue_after(lookup).and_then(|inner| {
        assert!(inner.is_nothing());
        Transaction::insert("users", user("after"))
    });

    let value = manager.run(program).await.unwrap();

    let statements: Vec<String> = backend.executed().into_iter().map(|(sql, _)| sql).collect();
    assert_eq!(
        statements,
        vec![
            "SELECT * FROM users WHERE id=?".to_string(),
            "INSERT INTO users(name) VALUES(?)".to_string(),
        ]
    );
    assert_eq!(value, TxValue::Id(1));
    assert_eq!(backend.commits(), 1);
}

#[tokio::test]
async fn continue_without_skip_passes_the_sub_program_value_on() {
    let (manager, _backend) = manager();
    let program = Transaction::continue_after(Transaction::insert("users", user("a")))
        .map(|id| TxValue::Value(RowValues::Int(id.as_id().unwrap_or_default() + 100)));

    let value = manager.run(program).await.unwrap();
    assert_eq!(value, TxValue::Value(RowValues::Int(101)));
}

#[tokio::test]
async fn fail_inside_continue_aborts_the_whole_run() {
    let (manager, backend) = manager();
    let program = Transaction::continue_after(
        Transaction::insert("users", user("a")).then(Transaction::abort("no thanks")),
    )
    .then(Transaction::insert("users", user("b")));

    let err = manager.run(program).await.unwrap_err();

    assert!(matches!(err, TxError::Aborted(ref msg) if msg == "no thanks"));
    assert_eq!(backend.executed().len(), 1);
    assert_eq!(backend.commits(), 0);
    assert_eq!(backend.rollbacks(), 1);
}

#[tokio::test]
async fn try_and_then_errors_abort() {
    let (manager, backend) = manager();
    let program = Transaction::insert("users", user("a"))
        .try_and_then(|_| Err(TxError::ParameterError("bad input".into())));

    let err = manager.run(program).await.unwrap_err();
    assert!(matches!(err, TxError::ParameterError(_)));
    assert_eq!(backend.rollbacks(), 1);
}

#[tokio::test]
async fn long_programs_do_not_grow_the_stack() {
    let (manager, backend) = manager();
    let program = (0..10_000).fold(Transaction::unit(TxValue::Value(RowValues::Int(0))), |p, _| {
        p.and_then(|v| {
            let n = match v {
                TxValue::Value(RowValues::Int(i)) => i,
                _ => -1,
            };
            Transaction::unit(TxValue::Value(RowValues::Int(n + 1)))
        })
    });

    let value = manager.run(program).await.unwrap();
    assert_eq!(value, TxValue::Value(RowValues::Int(10_000)));
    assert_eq!(backend.commits(), 1);
}

#[tokio::test]
async fn recursive_programs_run_lazily() {
    fn countdown(n: i64) -> Transaction {
        if n == 0 {
            return Transaction::unit(TxValue::Unit);
        }
        Transaction::emit("tick", json!(n)).and_then(move |_| countdown(n - 1))
    }

    let (manager, _backend) = manager();
    let sink = RecordingSink::new();
    manager
        .run_transaction(countdown(2_000), &sink)
        .await
        .unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 2_000);
    assert_eq!(events[0].payload, json!(2_000));
    assert_eq!(events[1_999].payload, json!(1));
}
