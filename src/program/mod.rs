//! Transaction programs.
//!
//! A [`Transaction`] is a plain value describing what to do inside one database transaction.
//! Building and composing programs performs no I/O and never calls a continuation; the
//! [`Interpreter`](crate::interpreter::Interpreter) walks the program later on a single
//! connection.
//!
//! ```rust
//! use sql_transactional::prelude::*;
//!
//! let program = Transaction::insert("users", Record::new().with("name", "alice"))
//!     .and_then(|id| {
//!         Transaction::emit("user_created", serde_json::json!({ "id": id.as_id() }))
//!             .map(move |_| id)
//!     });
//! # let _ = program;
//! ```

mod operation;
mod value;

pub use operation::Operation;
pub use value::TxValue;

use std::fmt;
use std::fmt::Display;
use std::future::Future;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{TxError, TxResult};
use crate::record::{DeleteTarget, Record};
use crate::types::{BoxFuture, RowValues, StatementHandle, StatementKind};

/// Continuation of a bind: receives the value of the step before it.
pub type Continuation = Box<dyn FnOnce(TxValue) -> Transaction + Send>;

/// An external future awaited in the middle of a program.
pub type AsyncValue = BoxFuture<'static, TxResult<TxValue>>;

pub(crate) enum Step {
    Return(TxValue),
    Fail(TxError),
    Skip(TxValue),
    Op(Operation),
    Lift(AsyncValue),
    Continue(Box<Transaction>),
    Bind(Box<Transaction>, Continuation),
}

/// A composable, not-yet-executed transaction program.
#[must_use = "a transaction program does nothing until it is run"]
pub struct Transaction {
    step: Step,
}

impl Transaction {
    fn from_step(step: Step) -> Self {
        Self { step }
    }

    pub(crate) fn into_step(self) -> Step {
        self.step
    }

    /// Finish with `value`.
    pub fn unit(value: impl Into<TxValue>) -> Self {
        Self::from_step(Step::Return(value.into()))
    }

    fn op(operation: Operation) -> Self {
        Self::from_step(Step::Op(operation))
    }

    /// Run `sql` once with positional bindings. `kind` decides what the result is.
    pub fn query(kind: StatementKind, sql: impl Into<String>, bindings: Vec<RowValues>) -> Self {
        Self::op(Operation::Query {
            kind,
            sql: sql.into(),
            bindings,
        })
    }

    /// Insert a record; results in the generated id.
    pub fn insert(table: impl Into<String>, record: Record) -> Self {
        Self::op(Operation::Insert {
            table: table.into(),
            record,
        })
    }

    /// Update the row matching the record's `id`.
    pub fn update(table: impl Into<String>, record: Record) -> Self {
        Self::op(Operation::Update {
            table: table.into(),
            record,
        })
    }

    pub fn delete(table: impl Into<String>, target: impl Into<DeleteTarget>) -> Self {
        Self::op(Operation::Delete {
            table: table.into(),
            target: target.into(),
        })
    }

    /// Read one row by id; results in `Record(None)` when it does not exist.
    pub fn read(table: impl Into<String>, id: impl Into<RowValues>) -> Self {
        Self::op(Operation::Read {
            table: table.into(),
            id: id.into(),
        })
    }

    pub fn prepare(kind: StatementKind, sql: impl Into<String>) -> Self {
        Self::op(Operation::Prepare {
            kind,
            sql: sql.into(),
        })
    }

    pub fn execute(statement: StatementHandle, bindings: Vec<RowValues>) -> Self {
        Self::op(Operation::Execute {
            statement,
            bindings,
        })
    }

    /// Record an event to publish after a successful commit.
    pub fn emit(event_type: impl Into<String>, payload: JsonValue) -> Self {
        Self::op(Operation::Emit {
            event_type: event_type.into(),
            payload,
        })
    }

    /// [`Transaction::emit`] with a serializable payload. A payload that fails to serialize
    /// makes the program fail when it reaches this step.
    pub fn emit_serialized<T: Serialize + ?Sized>(event_type: impl Into<String>, payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(payload) => Self::emit(event_type, payload),
            Err(err) => Self::fail(err.into()),
        }
    }

    /// Abort the transaction with `error`.
    pub fn fail(error: TxError) -> Self {
        Self::from_step(Step::Fail(error))
    }

    /// Abort the transaction with a message of the program's own.
    pub fn abort(message: impl Into<String>) -> Self {
        Self::fail(TxError::Aborted(message.into()))
    }

    /// Stop the innermost [`Transaction::continue_after`] scope, resuming the program around it
    /// with `value`. Outside any such scope the whole run ends successfully with `value`.
    pub fn skip(value: impl Into<TxValue>) -> Self {
        Self::from_step(Step::Skip(value.into()))
    }

    /// Run `sub` as a scope: a skip inside it ends only `sub`, and the surrounding program
    /// continues with the skipped value. Failures still abort the whole run.
    pub fn continue_after(sub: Transaction) -> Self {
        Self::from_step(Step::Continue(Box::new(sub)))
    }

    /// Await an external future. An `Err` aborts the transaction like [`Transaction::fail`].
    pub fn lift_async<F>(future: F) -> Self
    where
        F: Future<Output = TxResult<TxValue>> + Send + 'static,
    {
        Self::from_step(Step::Lift(Box::pin(future)))
    }

    /// [`Transaction::lift_async`] for futures with their own value and error types. Errors become
    /// `TxError::AsyncFailure`.
    pub fn lift_fallible<F, T, E>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Into<TxValue>,
        E: Display,
    {
        Self::lift_async(async move {
            future
                .await
                .map(Into::into)
                .map_err(|e| TxError::AsyncFailure(e.to_string()))
        })
    }

    /// Feed this program's value into `f` and continue with the program it returns.
    pub fn and_then<F>(self, f: F) -> Self
    where
        F: FnOnce(TxValue) -> Transaction + Send + 'static,
    {
        Self::from_step(Step::Bind(Box::new(self), Box::new(f)))
    }

    /// [`Transaction::and_then`] with a fallible continuation; `Err` aborts the run.
    pub fn try_and_then<F>(self, f: F) -> Self
    where
        F: FnOnce(TxValue) -> TxResult<Transaction> + Send + 'static,
    {
        self.and_then(|value| f(value).unwrap_or_else(Transaction::fail))
    }

    pub fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(TxValue) -> TxValue + Send + 'static,
    {
        self.and_then(|value| Transaction::unit(f(value)))
    }

    /// Run `next` after this program, discarding this program's value.
    pub fn then(self, next: Transaction) -> Self {
        self.and_then(move |_| next)
    }

    /// Skip the rest of the enclosing scope when this program reads nothing.
    pub fn maybe_skip(self) -> Self {
        self.and_then(|value| {
            if value.is_nothing() {
                Transaction::skip(value)
            } else {
                Transaction::unit(value)
            }
        })
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Step::Return(value) => f.debug_tuple("Return").field(value).finish(),
            Step::Fail(err) => f.debug_tuple("Fail").field(err).finish(),
            Step::Skip(value) => f.debug_tuple("Skip").field(value).finish(),
            Step::Op(op) => f.debug_tuple("Op").field(op).finish(),
            Step::Lift(_) => f.write_str("Lift(<future>)"),
            Step::Continue(sub) => f.debug_tuple("Continue").field(sub).finish(),
            Step::Bind(inner, _) => f.debug_tuple("Bind").field(inner).finish(),
        }
    }
}
