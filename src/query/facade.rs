//! Array-like view over a query's rows.
//!
//! Reads route to the resolved rows when available and start the lazy
//! fetches otherwise: index access starts the data fetch, `len` starts the
//! length fetch. In-range indices below a known length yield the
//! placeholder row until data arrives, so UI code can render skeletons
//! against the real column names.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::runner::Row;

use super::Query;

impl Query {
    /// The row at `index`, starting the data fetch on first access.
    ///
    /// Before data resolves, an in-range index below the known length
    /// yields the placeholder row (column names mapped to null) once the
    /// schema is known; anything else yields `None`.
    pub fn get(&self, index: usize) -> Option<Row> {
        self.trigger_data();
        self.lookup(index)
    }

    /// Like [`Query::get`], with negative indices counting from the end.
    pub fn at(&self, index: i64) -> Option<Row> {
        self.trigger_data();
        let len = self.current_len() as i64;
        let index = if index < 0 { len + index } else { index };
        if index < 0 {
            return None;
        }
        self.lookup(index as usize)
    }

    /// The row count, starting the length fetch on first access.
    ///
    /// Falls back to the resolved data length, and reports 0 while
    /// neither facet has resolved.
    pub fn len(&self) -> usize {
        self.trigger_length();
        self.current_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current rows, starting the data fetch.
    ///
    /// Unlike the plain [`Query::data`] accessor, this is part of the
    /// array-like read surface and behaves like index access: the fetch is
    /// triggered, and immediate runners fill the snapshot before it
    /// returns.
    pub fn rows(&self) -> Arc<Vec<Row>> {
        self.trigger_data();
        self.data()
    }

    /// Iterates a snapshot of the current rows, starting the data fetch.
    pub fn iter(&self) -> RowsIter {
        RowsIter {
            rows: self.rows(),
            index: 0,
        }
    }

    /// Structural check for values of this type.
    pub fn is_query(value: &dyn Any) -> bool {
        value.is::<Query>()
    }

    /// Length as currently known, without starting a fetch.
    fn current_len(&self) -> usize {
        if let Some(length) = self.inner.length.value() {
            return length;
        }
        if let Some(rows) = self.inner.data.value() {
            return rows.len();
        }
        0
    }

    fn lookup(&self, index: usize) -> Option<Row> {
        if let Some(rows) = self.inner.data.value() {
            return rows.get(index).cloned();
        }
        if index < self.current_len() {
            return self.inner.mock_row.lock().unwrap().clone();
        }
        None
    }
}

/// Snapshot iterator over a query's rows.
pub struct RowsIter {
    rows: Arc<Vec<Row>>,
    index: usize,
}

impl Iterator for RowsIter {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let row = self.rows.get(self.index).cloned();
        if row.is_some() {
            self.index += 1;
        }
        row
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.rows.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RowsIter {}

impl<'a> IntoIterator for &'a Query {
    type Item = Row;
    type IntoIter = RowsIter;

    fn into_iter(self) -> RowsIter {
        self.iter()
    }
}

impl fmt::Display for Query {
    /// Renders the current rows as a JSON array.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<Value> = self.data().iter().cloned().map(Value::Object).collect();
        let rendered = serde_json::to_string(&rows).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}
