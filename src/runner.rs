//! External query-runner contract and row representations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deferred::MaybeDeferred;
use crate::error::{QueryError, QueryResult};

/// One result row: an ordered mapping from column name to cell value.
pub type Row = serde_json::Map<String, Value>;

/// What a runner returns: rows now, or rows later.
pub type RunnerOutcome = MaybeDeferred<QueryResult<Vec<Row>>>;

/// Executes SQL text against a backing engine.
///
/// `label` describes the fetch for diagnostics. The returned rows are
/// treated as authoritative, including their order. Runners may fail
/// immediately or by deferred rejection.
pub trait QueryRunner: Send + Sync {
    fn run(&self, sql: &str, label: &str) -> RunnerOutcome;
}

impl<F> QueryRunner for F
where
    F: Fn(&str, &str) -> RunnerOutcome + Send + Sync,
{
    fn run(&self, sql: &str, label: &str) -> RunnerOutcome {
        self(sql, label)
    }
}

/// One row of a DESCRIBE result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub column_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
    /// Engine-specific describe fields (nullability, keys, defaults, ...).
    #[serde(flatten)]
    pub extra: Row,
}

impl ColumnDescriptor {
    /// A descriptor carrying only a column name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            column_name: name.into(),
            column_type: None,
            extra: Row::new(),
        }
    }

    /// Parses the rows of a DESCRIBE result.
    pub fn from_rows(rows: Vec<Row>) -> QueryResult<Vec<ColumnDescriptor>> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(Value::Object(row))
                    .map_err(|e| QueryError::MalformedResponse(format!("DESCRIBE row: {}", e)))
            })
            .collect()
    }
}
