//! Reactive, lazily-evaluated SQL query values.
//!
//! A [`Query`] behaves simultaneously as an array-like sequence of result
//! rows, a subscribable reactive store, an event emitter, and a fluent
//! query builder. Underneath, its three facets (column schema, row count,
//! data rows) are fetched on demand through a caller-supplied
//! [`QueryRunner`], coalesced between concurrent callers, and cached
//! process-wide by a fingerprint of the query text.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use sqlview::{MaybeDeferred, Query, QueryOptions, Row, RunnerOutcome};
//!
//! fn row(value: serde_json::Value) -> Row {
//!     value.as_object().cloned().unwrap_or_default()
//! }
//!
//! // A runner that answers every fetch immediately.
//! fn runner(sql: &str, _label: &str) -> RunnerOutcome {
//!     MaybeDeferred::ready(Ok(if sql.contains("DESCRIBE") {
//!         vec![row(json!({"column_name": "n", "column_type": "INTEGER"}))]
//!     } else if sql.contains("rowCount") {
//!         vec![row(json!({"rowCount": 1}))]
//!     } else {
//!         vec![row(json!({"n": 42}))]
//!     }))
//! }
//!
//! let q = Query::create("SELECT 42 AS n", Arc::new(runner), QueryOptions::default()).unwrap();
//! assert_eq!(q.len(), 1);
//! assert_eq!(q.get(0).unwrap()["n"], json!(42));
//! assert_eq!(q.columns()[0].column_name, "n");
//! ```

pub mod builder;
pub mod cache;
pub mod deferred;
pub mod error;
pub mod fingerprint;
pub mod query;
pub mod runner;
pub mod shared_promise;

pub use builder::{sql, SelectBuilder, SqlFragment};
pub use deferred::{resolve_with, MaybeDeferred};
pub use error::{QueryError, QueryResult};
pub use fingerprint::fingerprint;
pub use query::events::{EventPayload, QueryEvent};
pub use query::facade::RowsIter;
pub use query::{Facet, Query, QueryInput, QueryOptions};
pub use runner::{ColumnDescriptor, QueryRunner, Row, RunnerOutcome};
pub use shared_promise::{PromiseState, SharedPromise};
