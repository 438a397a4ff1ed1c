use crate::connection::Connection;
use crate::error::TxResult;
use crate::events::BufferedEvents;
use crate::mapper;
use crate::program::{Continuation, Operation, Step, Transaction, TxValue};

enum Frame {
    /// Continuation waiting for the value of the step being run.
    Then(Continuation),
    /// Boundary of a `continue_after` scope; skips unwind to here.
    Resume,
}

/// Walk `program` on `conn` until it returns, skips out of the top level, or fails.
///
/// Continuations live on an explicit frame stack, so long programs and deeply nested binds do
/// not grow the call stack. Operations run strictly one at a time.
pub(crate) async fn run_program(
    conn: &mut dyn Connection,
    program: Transaction,
    events: &mut BufferedEvents,
) -> TxResult<TxValue> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut current = program;

    loop {
        let value = match current.into_step() {
            Step::Bind(inner, continuation) => {
                frames.push(Frame::Then(continuation));
                current = *inner;
                continue;
            }
            Step::Continue(sub) => {
                frames.push(Frame::Resume);
                current = *sub;
                continue;
            }
            Step::Return(value) => value,
            Step::Op(operation) => perform(&mut *conn, operation, events).await?,
            Step::Lift(future) => future.await?,
            Step::Fail(err) => return Err(err),
            Step::Skip(value) => {
                loop {
                    match frames.pop() {
                        Some(Frame::Resume) => break,
                        Some(Frame::Then(_)) => {}
                        None => return Ok(value),
                    }
                }
                value
            }
        };

        loop {
            match frames.pop() {
                None => return Ok(value),
                Some(Frame::Resume) => {}
                Some(Frame::Then(continuation)) => {
                    current = continuation(value);
                    break;
                }
            }
        }
    }
}

async fn perform(
    conn: &mut dyn Connection,
    operation: Operation,
    events: &mut BufferedEvents,
) -> TxResult<TxValue> {
    tracing::trace!(operation = operation.name(), "performing operation");
    match operation {
        Operation::Query {
            kind,
            sql,
            bindings,
        } => mapper::query(conn, kind, &sql, &bindings)
            .await
            .map(TxValue::from),
        Operation::Insert { table, record } => mapper::insert(conn, &table, &record)
            .await
            .map(TxValue::Id),
        Operation::Update { table, record } => {
            mapper::update(conn, &table, &record).await?;
            Ok(TxValue::Unit)
        }
        Operation::Delete { table, target } => {
            mapper::delete(conn, &table, &target).await?;
            Ok(TxValue::Unit)
        }
        Operation::Read { table, id } => mapper::read(conn, &table, &id)
            .await
            .map(TxValue::Record),
        Operation::Prepare { kind, sql } => conn
            .prepare(&sql, kind)
            .await
            .map(TxValue::Statement),
        Operation::Execute {
            statement,
            bindings,
        } => conn
            .execute(&statement, &bindings)
            .await
            .map(TxValue::from),
        Operation::Emit {
            event_type,
            payload,
        } => {
            events.push(event_type, payload);
            Ok(TxValue::Unit)
        }
    }
}
