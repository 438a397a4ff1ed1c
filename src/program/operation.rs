use serde_json::Value as JsonValue;

use crate::record::{DeleteTarget, Record};
use crate::types::{RowValues, StatementHandle, StatementKind};

/// A single database or event operation inside a transaction program.
///
/// | Operation | Result |
/// |---|---|
/// | `Query` | `Rows`, `Id` or `Affected` according to `kind` |
/// | `Insert` | `Id` |
/// | `Update`, `Delete`, `Emit` | `Unit` |
/// | `Read` | `Record(Some(_))` or `Record(None)` |
/// | `Prepare` | `Statement` |
/// | `Execute` | as `Query`, by the statement's kind |
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Query {
        kind: StatementKind,
        sql: String,
        bindings: Vec<RowValues>,
    },
    Insert {
        table: String,
        record: Record,
    },
    Update {
        table: String,
        record: Record,
    },
    Delete {
        table: String,
        target: DeleteTarget,
    },
    Read {
        table: String,
        id: RowValues,
    },
    Prepare {
        kind: StatementKind,
        sql: String,
    },
    Execute {
        statement: StatementHandle,
        bindings: Vec<RowValues>,
    },
    /// Buffer an event; published only if the transaction commits.
    Emit {
        event_type: String,
        payload: JsonValue,
    },
}

impl Operation {
    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Query { .. } => "query",
            Operation::Insert { .. } => "insert",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::Read { .. } => "read",
            Operation::Prepare { .. } => "prepare",
            Operation::Execute { .. } => "execute",
            Operation::Emit { .. } => "emit",
        }
    }
}
