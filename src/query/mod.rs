//! Reactive, lazily-evaluated query values.
//!
//! A [`Query`] represents one SQL result through three independently
//! fetched facets: the column schema, the total row count, and the data
//! rows. Columns and length are fetched eagerly at construction, data on
//! first access. Each facet is coalesced behind a [`SharedPromise`], so
//! concurrent callers share a single runner invocation, and every state
//! transition notifies subscribers.

pub mod events;
pub mod facade;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::builder::{SelectBuilder, SqlFragment};
use crate::deferred::{resolve_with, MaybeDeferred};
use crate::error::{QueryError, QueryResult};
use crate::fingerprint::fingerprint;
use crate::runner::{ColumnDescriptor, QueryRunner, Row};
use crate::shared_promise::{ChangeCallback, PromiseState, SharedPromise};

use self::events::{EventPayload, HandlerFn, QueryEvent, SubscriberFn};

/// One of the three independently fetched views of a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Columns,
    Length,
    Data,
}

impl Facet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Facet::Columns => "columns",
            Facet::Length => "length",
            Facet::Data => "data",
        }
    }
}

impl std::fmt::Display for Facet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted query inputs: raw SQL text or a prepared builder.
#[derive(Debug, Clone)]
pub enum QueryInput {
    Text(String),
    Builder(SelectBuilder),
}

impl QueryInput {
    /// The text this input identifies the query by: raw text as provided,
    /// or the builder's rendering.
    pub(crate) fn original_text(&self) -> String {
        match self {
            QueryInput::Text(text) => text.clone(),
            QueryInput::Builder(builder) => builder.to_string(),
        }
    }
}

impl From<&str> for QueryInput {
    fn from(text: &str) -> Self {
        QueryInput::Text(text.to_string())
    }
}

impl From<String> for QueryInput {
    fn from(text: String) -> Self {
        QueryInput::Text(text)
    }
}

impl From<SelectBuilder> for QueryInput {
    fn from(builder: SelectBuilder) -> Self {
        QueryInput::Builder(builder)
    }
}

/// Options accepted by [`Query::create`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Diagnostic label; defaults to the fingerprint.
    pub id: Option<String>,
    /// Pre-seeded rows; the data facet starts resolved and is never fetched.
    pub initial_data: Option<Vec<Row>>,
    /// Already-known schema; suppresses the DESCRIBE fetch.
    pub known_columns: Option<Vec<ColumnDescriptor>>,
    /// Construction-time terminal error; no fetches are scheduled.
    pub initial_error: Option<QueryError>,
    /// Skips the process-wide cache for this value.
    pub disable_cache: bool,
    /// Refuses every fetch; the value stays inert.
    pub no_resolve: bool,
}

impl QueryOptions {
    /// Options carrying only a diagnostic id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// Notifications after which a query assumes a subscriber-induced loop.
pub(crate) const MAX_PUBLICATIONS: usize = 100_000;

static DIRECT_CONSTRUCTION_WARNED: AtomicBool = AtomicBool::new(false);

/// Cheaply cloneable handle to one reactive query result.
///
/// Clones share the same underlying value: facet latches, subscribers,
/// and the sticky error slot are common to every handle. Handles compare
/// equal exactly when they share that value.
#[derive(Clone)]
pub struct Query {
    pub(crate) inner: Arc<QueryInner>,
}

pub(crate) struct QueryInner {
    pub(crate) original_text: String,
    pub(crate) builder: SelectBuilder,
    pub(crate) id: String,
    pub(crate) hash: String,
    pub(crate) runner: Arc<dyn QueryRunner>,
    pub(crate) no_resolve: bool,
    pub(crate) columns: SharedPromise<Vec<ColumnDescriptor>>,
    pub(crate) length: SharedPromise<usize>,
    pub(crate) data: SharedPromise<Arc<Vec<Row>>>,
    /// Placeholder row (column names mapped to null), built once the
    /// schema is known.
    pub(crate) mock_row: Mutex<Option<Row>>,
    /// Sticky terminal error; once set, no facet may start loading.
    pub(crate) error: Mutex<Option<QueryError>>,
    pub(crate) subscribers: Mutex<Vec<(usize, SubscriberFn)>>,
    pub(crate) handlers: Mutex<HashMap<QueryEvent, Vec<(usize, HandlerFn)>>>,
    pub(crate) next_callback_id: AtomicUsize,
    pub(crate) publish_count: AtomicUsize,
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Query {}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("id", &self.inner.id)
            .field("hash", &self.inner.hash)
            .field("columns", &self.inner.columns.state())
            .field("length", &self.inner.length.state())
            .field("data", &self.inner.data.state())
            .field("error", &*self.inner.error.lock().unwrap())
            .finish()
    }
}

fn facet_callback(weak: Weak<QueryInner>, facet: Facet) -> ChangeCallback {
    Box::new(move |state: PromiseState| {
        if let Some(inner) = weak.upgrade() {
            let query = Query { inner };
            query.publish(&format!("{} promise ({})", facet.as_str(), state.as_str()));
        }
    })
}

impl Query {
    /// Builds or reuses the query value for `query`.
    ///
    /// This is the intended constructor path: identical query texts share
    /// one value (and therefore one fetch per facet) unless
    /// `disable_cache` is set.
    pub fn create(
        query: impl Into<QueryInput>,
        runner: Arc<dyn QueryRunner>,
        opts: QueryOptions,
    ) -> QueryResult<Query> {
        crate::cache::create(query.into(), runner, opts)
    }

    /// Constructs a query value directly, bypassing the cache.
    ///
    /// Prefer [`Query::create`]; direct construction forfeits fetch
    /// sharing between identical queries.
    pub fn new(
        query: impl Into<QueryInput>,
        runner: Arc<dyn QueryRunner>,
        opts: QueryOptions,
    ) -> QueryResult<Query> {
        if !DIRECT_CONSTRUCTION_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!("Query::new bypasses the query cache; prefer Query::create");
        }
        let input = query.into();
        crate::cache::validate(&input)?;
        Ok(Self::construct(input, runner, opts))
    }

    /// Assembles the value and schedules the construction-time fetches.
    pub(crate) fn construct(
        input: QueryInput,
        runner: Arc<dyn QueryRunner>,
        opts: QueryOptions,
    ) -> Query {
        let original_text = input.original_text();
        let hash = fingerprint(&[&original_text]);
        let id = opts.id.clone().unwrap_or_else(|| hash.clone());
        let builder = match input {
            QueryInput::Text(text) => SelectBuilder::wrap_raw(text),
            QueryInput::Builder(builder) => builder,
        };
        let initial_columns = opts.known_columns.clone();
        let initial_data = opts.initial_data.clone().map(Arc::new);
        let initial_error = opts.initial_error.clone();

        let inner = Arc::new_cyclic(|weak: &Weak<QueryInner>| {
            let columns = match initial_columns {
                Some(columns) => {
                    SharedPromise::resolved(columns, facet_callback(weak.clone(), Facet::Columns))
                }
                None => SharedPromise::new(facet_callback(weak.clone(), Facet::Columns)),
            };
            let data = match initial_data {
                Some(rows) => {
                    SharedPromise::resolved(rows, facet_callback(weak.clone(), Facet::Data))
                }
                None => SharedPromise::new(facet_callback(weak.clone(), Facet::Data)),
            };
            QueryInner {
                original_text,
                builder,
                id,
                hash,
                runner,
                no_resolve: opts.no_resolve,
                columns,
                length: SharedPromise::new(facet_callback(weak.clone(), Facet::Length)),
                data,
                mock_row: Mutex::new(None),
                error: Mutex::new(initial_error),
                subscribers: Mutex::new(Vec::new()),
                handlers: Mutex::new(HashMap::new()),
                next_callback_id: AtomicUsize::new(0),
                publish_count: AtomicUsize::new(0),
            }
        });
        let query = Query { inner };

        // Known columns still produce a placeholder row for early reads.
        if let Some(columns) = opts.known_columns.as_ref() {
            query.store_mock_row(columns);
        }

        if query.error().is_none() {
            // Columns and length are eager; data waits for first access.
            if query.inner.columns.state() == PromiseState::Init {
                query.trigger_columns();
            }
            query.trigger_length();
        }
        query
    }

    // --- identity and facet accessors -----------------------------------

    /// The query text as provided by the caller.
    pub fn original_text(&self) -> &str {
        &self.inner.original_text
    }

    /// The rendered text actually executed (wrapped for raw string inputs).
    pub fn text(&self) -> String {
        self.inner.builder.to_string()
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Fingerprint of the original text; stable across instances.
    pub fn hash(&self) -> &str {
        &self.inner.hash
    }

    /// The sticky terminal error, if any.
    pub fn error(&self) -> Option<QueryError> {
        self.inner.error.lock().unwrap().clone()
    }

    /// The resolved schema; empty until the columns facet resolves.
    pub fn columns(&self) -> Vec<ColumnDescriptor> {
        self.inner.columns.value().unwrap_or_default()
    }

    /// The resolved rows; empty until the data facet resolves.
    pub fn data(&self) -> Arc<Vec<Row>> {
        self.inner.data.value().unwrap_or_default()
    }

    /// Alias of [`Query::data`].
    pub fn value(&self) -> Arc<Vec<Row>> {
        self.data()
    }

    /// All three facets resolved.
    pub fn ready(&self) -> bool {
        self.inner.columns.state() == PromiseState::Resolved
            && self.inner.length.state() == PromiseState::Resolved
            && self.inner.data.state() == PromiseState::Resolved
    }

    /// Any facet currently loading.
    pub fn loading(&self) -> bool {
        self.inner.columns.state() == PromiseState::Loading
            || self.inner.length.state() == PromiseState::Loading
            || self.inner.data.state() == PromiseState::Loading
    }

    /// Settled (resolved or rejected).
    pub fn columns_loaded(&self) -> bool {
        self.inner.columns.is_settled()
    }

    pub fn columns_loading(&self) -> bool {
        self.inner.columns.state() == PromiseState::Loading
    }

    /// Settled (resolved or rejected).
    pub fn length_loaded(&self) -> bool {
        self.inner.length.is_settled()
    }

    pub fn length_loading(&self) -> bool {
        self.inner.length.state() == PromiseState::Loading
    }

    /// Settled (resolved or rejected).
    pub fn data_loaded(&self) -> bool {
        self.inner.data.is_settled()
    }

    pub fn data_loading(&self) -> bool {
        self.inner.data.state() == PromiseState::Loading
    }

    // --- fetches ---------------------------------------------------------

    /// Triggers the data fetch (if not already started) and awaits the rows.
    ///
    /// Subsequent calls settle with the same outcome without invoking the
    /// runner again. A refused fetch (sticky error set, or `no_resolve`)
    /// leaves the data facet in `Init` with nothing that could ever settle
    /// it, so this settles immediately instead: with the sticky error when
    /// one is set, otherwise with the current (empty) row snapshot.
    pub async fn fetch(&self) -> QueryResult<Arc<Vec<Row>>> {
        self.trigger_data();
        if self.inner.data.state() == PromiseState::Init {
            if let Some(err) = self.error() {
                return Err(err);
            }
            return Ok(self.data());
        }
        self.inner.data.wait().await
    }

    /// True when a fetch for `facet` must not start.
    fn fetch_refused(&self, facet: Facet) -> bool {
        if self.inner.no_resolve {
            tracing::debug!(query = %self.inner.id, facet = %facet, "fetch refused (no_resolve)");
            return true;
        }
        if let Some(err) = self.error() {
            tracing::debug!(
                query = %self.inner.id,
                facet = %facet,
                error = %err,
                "fetch refused (query already failed)"
            );
            return true;
        }
        false
    }

    pub(crate) fn trigger_columns(&self) {
        if self.fetch_refused(Facet::Columns) || !self.inner.columns.start() {
            return;
        }
        let label = format!("Columns {} ({})", self.inner.id, self.inner.hash);
        let sql = format!("-- {}\nDESCRIBE {}\n", label, self.inner.builder);
        tracing::debug!(query = %self.inner.id, "fetching columns");
        let on_ok = {
            let q = self.clone();
            move |rows: Vec<Row>, _was_deferred: bool| match ColumnDescriptor::from_rows(rows) {
                Ok(columns) => {
                    q.complete_columns(columns);
                    Ok(())
                }
                Err(err) => {
                    q.fail(Facet::Columns, err.clone());
                    Err(err)
                }
            }
        };
        let outcome = self.inner.runner.run(&sql, &label);
        self.drive(resolve_with(outcome, on_ok, self.fail_handler(Facet::Columns)));
    }

    pub(crate) fn trigger_length(&self) {
        if self.fetch_refused(Facet::Length) {
            return;
        }
        // Resolved data already carries the count; no COUNT query is issued.
        if let Some(rows) = self.inner.data.value() {
            if self.inner.length.start() {
                self.inner.length.resolve(rows.len());
            }
            return;
        }
        if !self.inner.length.start() {
            return;
        }
        let label = format!("Length {} ({})", self.inner.id, self.inner.hash);
        let sql = format!(
            "-- {}\nSELECT COUNT(*) AS rowCount FROM ({})\n",
            label, self.inner.builder
        );
        tracing::debug!(query = %self.inner.id, "fetching length");
        let on_ok = {
            let q = self.clone();
            move |rows: Vec<Row>, _was_deferred: bool| match parse_row_count(&rows) {
                Ok(count) => {
                    q.inner.length.resolve(count);
                    Ok(())
                }
                Err(err) => {
                    q.fail(Facet::Length, err.clone());
                    Err(err)
                }
            }
        };
        let outcome = self.inner.runner.run(&sql, &label);
        self.drive(resolve_with(outcome, on_ok, self.fail_handler(Facet::Length)));
    }

    pub(crate) fn trigger_data(&self) {
        if self.fetch_refused(Facet::Data) || !self.inner.data.start() {
            return;
        }
        let label = format!("Data {} {}", self.inner.id, self.inner.hash);
        let sql = format!("-- {}\n{}\n", label, self.inner.builder);
        tracing::debug!(query = %self.inner.id, "fetching data");
        let on_ok = {
            let q = self.clone();
            move |rows: Vec<Row>, _was_deferred: bool| {
                q.inner.data.resolve(Arc::new(rows));
                q.emit(QueryEvent::DataReady, EventPayload::None);
                Ok(())
            }
        };
        let outcome = self.inner.runner.run(&sql, &label);
        self.drive(resolve_with(outcome, on_ok, self.fail_handler(Facet::Data)));
    }

    /// Spawns the asynchronous tail of a fetch; immediate fetches have
    /// already settled by the time this runs.
    fn drive(&self, settled: MaybeDeferred<QueryResult<()>>) {
        if let MaybeDeferred::Deferred(future) = settled {
            tokio::spawn(async move {
                let _ = future.await;
            });
        }
    }

    fn fail_handler(
        &self,
        facet: Facet,
    ) -> impl FnOnce(QueryError, bool) -> QueryError + Send + 'static {
        let q = self.clone();
        move |err: QueryError, _was_deferred: bool| {
            q.fail(facet, err.clone());
            err
        }
    }

    fn complete_columns(&self, columns: Vec<ColumnDescriptor>) {
        self.store_mock_row(&columns);
        self.inner.columns.resolve(columns);
    }

    fn store_mock_row(&self, columns: &[ColumnDescriptor]) {
        let mut mock = Row::new();
        for column in columns {
            mock.insert(column.column_name.clone(), serde_json::Value::Null);
        }
        *self.inner.mock_row.lock().unwrap() = Some(mock);
    }

    /// Records the terminal error (first one wins) and rejects every facet
    /// still in flight. Already-resolved facets keep their values.
    pub(crate) fn fail(&self, facet: Facet, err: QueryError) {
        tracing::debug!(query = %self.inner.id, facet = %facet, error = %err, "fetch failed");
        self.set_error(err.clone());
        self.inner.columns.reject(err.clone());
        self.inner.length.reject(err.clone());
        self.inner.data.reject(err);
    }

    fn set_error(&self, err: QueryError) {
        {
            let mut slot = self.inner.error.lock().unwrap();
            if slot.is_some() {
                return;
            }
            *slot = Some(err.clone());
        }
        self.emit(QueryEvent::Error, EventPayload::Error(err));
    }

    // --- fluent refinements ----------------------------------------------

    /// Derived query with `predicate` appended to the WHERE conjunction.
    ///
    /// The derived value is a fresh cached query (fresh hash over the
    /// refined text) that inherits this query's resolved columns, so no
    /// redundant DESCRIBE is issued.
    pub fn where_(&self, predicate: impl Into<SqlFragment>) -> Query {
        self.derive(self.inner.builder.clone().where_(predicate))
    }

    /// Derived query capped at `n` rows.
    pub fn limit(&self, n: u64) -> Query {
        self.derive(self.inner.builder.clone().limit(n))
    }

    /// Derived query skipping the first `n` rows.
    pub fn offset(&self, n: u64) -> Query {
        self.derive(self.inner.builder.clone().offset(n))
    }

    /// Derived query for one page: skip `offset` rows, return `n`.
    pub fn paginate(&self, offset: u64, n: u64) -> Query {
        self.derive(self.inner.builder.clone().offset(offset).limit(n))
    }

    fn derive(&self, builder: SelectBuilder) -> Query {
        let opts = QueryOptions {
            known_columns: self.inner.columns.value(),
            ..QueryOptions::default()
        };
        crate::cache::obtain(QueryInput::Builder(builder), self.inner.runner.clone(), opts)
    }
}

fn parse_row_count(rows: &[Row]) -> QueryResult<usize> {
    rows.first()
        .and_then(|row| row.get("rowCount"))
        .and_then(|count| count.as_u64())
        .map(|count| count as usize)
        .ok_or_else(|| {
            QueryError::MalformedResponse("length query returned no rowCount".to_string())
        })
}
