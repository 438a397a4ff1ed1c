//! Record mapping: column/value records to single-table statements.
//!
//! Builders produce [`QueryAndParams`] with `?` placeholders in record column order. The async
//! helpers run one statement on a connection through prepare, execute and destroy; the
//! statement is destroyed whether or not execution succeeded.

use crate::connection::{Connection, StatementOutcome};
use crate::error::{TxError, TxResult};
use crate::record::{DeleteTarget, ID_COLUMN, Record};
use crate::types::{QueryAndParams, RowValues, StatementKind};

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

/// `INSERT INTO t(k1,k2) VALUES(?,?)`
///
/// # Errors
/// Returns `TxError::ParameterError` if the record is empty.
pub fn insert_statement(table: &str, record: &Record) -> TxResult<QueryAndParams> {
    if record.is_empty() {
        return Err(TxError::ParameterError(format!(
            "cannot insert an empty record into {table}"
        )));
    }
    let columns = record.columns().collect::<Vec<_>>().join(",");
    let sql = format!(
        "INSERT INTO {table}({columns}) VALUES({})",
        placeholders(record.len())
    );
    Ok(QueryAndParams::new(
        StatementKind::Insert,
        sql,
        record.values().cloned().collect(),
    ))
}

/// `UPDATE t SET k1=?,k2=? WHERE id=?`
///
/// The `id` column selects the row and is not part of the `SET` list.
///
/// # Errors
/// Returns `TxError::ParameterError` if the record has no `id` or nothing else to set.
pub fn update_statement(table: &str, record: &Record) -> TxResult<QueryAndParams> {
    let id = record.id().cloned().ok_or_else(|| {
        TxError::ParameterError(format!("update on {table} requires an {ID_COLUMN} column"))
    })?;

    let (setters, mut params): (Vec<String>, Vec<RowValues>) = record
        .iter()
        .filter(|(column, _)| *column != ID_COLUMN)
        .map(|(column, value)| (format!("{column}=?"), value.clone()))
        .unzip();
    if setters.is_empty() {
        return Err(TxError::ParameterError(format!(
            "update on {table} has no columns to set"
        )));
    }
    params.push(id);

    let sql = format!(
        "UPDATE {table} SET {} WHERE {ID_COLUMN}=?",
        setters.join(",")
    );
    Ok(QueryAndParams::new(StatementKind::Update, sql, params))
}

/// `DELETE FROM t WHERE id=?`
///
/// # Errors
/// Returns `TxError::ParameterError` if the target is a record without `id`.
pub fn delete_statement(table: &str, target: &DeleteTarget) -> TxResult<QueryAndParams> {
    Ok(QueryAndParams::new(
        StatementKind::Delete,
        format!("DELETE FROM {table} WHERE {ID_COLUMN}=?"),
        vec![target.id_value()?],
    ))
}

/// `SELECT * FROM t WHERE id=?`
#[must_use]
pub fn read_statement(table: &str, id: &RowValues) -> QueryAndParams {
    QueryAndParams::new(
        StatementKind::Select,
        format!("SELECT * FROM {table} WHERE {ID_COLUMN}=?"),
        vec![id.clone()],
    )
}

/// Prepare, execute and destroy one statement.
///
/// # Errors
/// Propagates the connection's prepare or execute error.
pub async fn query(
    conn: &mut dyn Connection,
    kind: StatementKind,
    sql: &str,
    bindings: &[RowValues],
) -> TxResult<StatementOutcome> {
    let statement = conn.prepare(sql, kind).await?;
    let outcome = conn.execute(&statement, bindings).await;
    conn.destroy(&statement);
    outcome
}

async fn run(conn: &mut dyn Connection, statement: &QueryAndParams) -> TxResult<StatementOutcome> {
    query(conn, statement.kind, &statement.query, &statement.params).await
}

/// Insert `record` and return the generated id.
///
/// # Errors
/// Returns the builder or connection error, or `TxError::UnexpectedValue` if the driver did not
/// report an inserted id.
pub async fn insert(conn: &mut dyn Connection, table: &str, record: &Record) -> TxResult<i64> {
    match run(conn, &insert_statement(table, record)?).await? {
        StatementOutcome::Inserted(id) => Ok(id),
        other => Err(TxError::UnexpectedValue(format!(
            "insert into {table} produced {other:?} instead of an id"
        ))),
    }
}

/// # Errors
/// Returns the builder or connection error.
pub async fn update(conn: &mut dyn Connection, table: &str, record: &Record) -> TxResult<()> {
    run(conn, &update_statement(table, record)?).await?;
    Ok(())
}

/// # Errors
/// Returns the builder or connection error.
pub async fn delete(conn: &mut dyn Connection, table: &str, target: &DeleteTarget) -> TxResult<()> {
    run(conn, &delete_statement(table, target)?).await?;
    Ok(())
}

/// Read the row with the given id; `None` when no row matches.
///
/// # Errors
/// Returns the connection error, or `TxError::UnexpectedValue` if the driver returned no rows
/// for the select.
pub async fn read(
    conn: &mut dyn Connection,
    table: &str,
    id: &RowValues,
) -> TxResult<Option<Record>> {
    match run(conn, &read_statement(table, id)).await? {
        StatementOutcome::Rows(rows) => Ok(rows.first().map(|row| row.to_record())),
        other => Err(TxError::UnexpectedValue(format!(
            "read from {table} produced {other:?} instead of rows"
        ))),
    }
}
