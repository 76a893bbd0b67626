//! Process-wide cache of query values keyed by fingerprint.
//!
//! The cache is insert-only and never evicts: values live for the process
//! lifetime, so identical query texts always share one value and therefore
//! one runner invocation per facet.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::error::{QueryError, QueryResult};
use crate::fingerprint::fingerprint;
use crate::query::{Query, QueryInput, QueryOptions};
use crate::runner::QueryRunner;

static QUERY_CACHE: OnceLock<DashMap<String, Query>> = OnceLock::new();

fn cache() -> &'static DashMap<String, Query> {
    QUERY_CACHE.get_or_init(DashMap::new)
}

/// Validates a query input before construction.
pub(crate) fn validate(input: &QueryInput) -> QueryResult<()> {
    match input {
        QueryInput::Text(text) if text.trim().is_empty() => Err(QueryError::InvalidQuery(
            "query text is empty".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Builds or reuses the query value for `input`.
pub(crate) fn create(
    input: QueryInput,
    runner: Arc<dyn QueryRunner>,
    opts: QueryOptions,
) -> QueryResult<Query> {
    validate(&input)?;
    Ok(obtain(input, runner, opts))
}

/// Cache lookup and construction for pre-validated inputs.
pub(crate) fn obtain(input: QueryInput, runner: Arc<dyn QueryRunner>, opts: QueryOptions) -> Query {
    let hash = fingerprint(&[&input.original_text()]);
    let use_cache = !opts.disable_cache;
    if use_cache {
        if let Some(existing) = cache().get(&hash) {
            tracing::debug!(hash = %hash, "query cache hit");
            return existing.clone();
        }
    }
    let query = Query::construct(input, runner, opts);
    if use_cache {
        cache().insert(hash, query.clone());
    }
    query
}

/// Statistics of the process-wide cache.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
}

pub fn stats() -> CacheStats {
    CacheStats {
        entries: cache().len(),
    }
}
