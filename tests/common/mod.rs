//! Common test utilities
//!
//! Provides a scriptable stub runner standing in for the backing engine:
//! canned responses per facet, optional deferral and failure, and a log of
//! every executed SQL text for coalescing assertions.
#![allow(dead_code)]

use std::sync::Mutex;

use serde_json::{json, Value};
use sqlview::{MaybeDeferred, QueryError, Row, RunnerOutcome};

/// Builds a row from a JSON object literal.
pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

pub struct StubRunner {
    pub columns: Vec<Row>,
    pub length: u64,
    pub data: Vec<Row>,
    /// Answer the data fetch through a deferred future instead of
    /// immediately.
    pub defer_data: bool,
    /// Fail the data fetch with this message.
    pub fail_data: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl StubRunner {
    pub fn new(columns: Vec<Row>, data: Vec<Row>) -> Self {
        Self {
            length: data.len() as u64,
            columns,
            data,
            defer_data: false,
            fail_data: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Runner for a two-column `users` result.
    pub fn users() -> Self {
        Self::new(
            vec![
                row(json!({"column_name": "name", "column_type": "VARCHAR"})),
                row(json!({"column_name": "age", "column_type": "INTEGER"})),
            ],
            vec![
                row(json!({"name": "Alice", "age": 30})),
                row(json!({"name": "Bob", "age": 25})),
            ],
        )
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn describe_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|sql| sql.contains("DESCRIBE"))
            .count()
    }

    pub fn count_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|sql| sql.contains("COUNT(*)"))
            .count()
    }

    pub fn data_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|sql| sql.starts_with("-- Data"))
            .count()
    }
}

impl sqlview::QueryRunner for StubRunner {
    fn run(&self, sql: &str, _label: &str) -> RunnerOutcome {
        self.calls.lock().unwrap().push(sql.to_string());
        if sql.starts_with("-- Columns") {
            return MaybeDeferred::ready(Ok(self.columns.clone()));
        }
        if sql.starts_with("-- Length") {
            return MaybeDeferred::ready(Ok(vec![row(json!({"rowCount": self.length}))]));
        }
        if let Some(message) = self.fail_data.clone() {
            let err = QueryError::Runner(message);
            return if self.defer_data {
                MaybeDeferred::deferred(async move {
                    tokio::task::yield_now().await;
                    Err(err)
                })
            } else {
                MaybeDeferred::ready(Err(err))
            };
        }
        let rows = self.data.clone();
        if self.defer_data {
            MaybeDeferred::deferred(async move {
                tokio::task::yield_now().await;
                Ok(rows)
            })
        } else {
            MaybeDeferred::ready(Ok(rows))
        }
    }
}
