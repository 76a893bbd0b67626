//! Bridging synchronous and asynchronous runner outcomes.
//!
//! Runners backed by in-memory or pre-cached results complete instantly;
//! others defer. [`resolve_with`] applies the caller's handlers either way
//! without forcing immediate results through an extra scheduling round-trip,
//! which keeps first reads synchronous when the runner allows it.

use futures::future::BoxFuture;
use std::future::Future;

use crate::error::{QueryError, QueryResult};

/// A value that is available now or later.
pub enum MaybeDeferred<T> {
    Immediate(T),
    Deferred(BoxFuture<'static, T>),
}

impl<T> MaybeDeferred<T> {
    pub fn ready(value: T) -> Self {
        MaybeDeferred::Immediate(value)
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        MaybeDeferred::Deferred(Box::pin(future))
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, MaybeDeferred::Immediate(_))
    }

    /// Awaits the value, settling immediately for the immediate variant.
    pub async fn settle(self) -> T {
        match self {
            MaybeDeferred::Immediate(value) => value,
            MaybeDeferred::Deferred(future) => future.await,
        }
    }
}

/// Applies `on_ok` / `on_err` to a possibly-deferred result.
///
/// Immediate inputs invoke their handler synchronously before this function
/// returns; deferred inputs produce a deferred output whose settlement
/// mirrors the handler. The second handler argument reports whether the
/// input was deferred, letting handlers distinguish synchronous callers
/// from asynchronous ones.
pub fn resolve_with<T, U, S, F>(
    input: MaybeDeferred<QueryResult<T>>,
    on_ok: S,
    on_err: F,
) -> MaybeDeferred<QueryResult<U>>
where
    T: Send + 'static,
    U: Send + 'static,
    S: FnOnce(T, bool) -> QueryResult<U> + Send + 'static,
    F: FnOnce(QueryError, bool) -> QueryError + Send + 'static,
{
    match input {
        MaybeDeferred::Immediate(Ok(value)) => MaybeDeferred::Immediate(on_ok(value, false)),
        MaybeDeferred::Immediate(Err(err)) => MaybeDeferred::Immediate(Err(on_err(err, false))),
        MaybeDeferred::Deferred(future) => MaybeDeferred::Deferred(Box::pin(async move {
            match future.await {
                Ok(value) => on_ok(value, true),
                Err(err) => Err(on_err(err, true)),
            }
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_ok_runs_synchronously() {
        let input: MaybeDeferred<QueryResult<i32>> = MaybeDeferred::ready(Ok(2));
        let result = resolve_with(
            input,
            |value, was_deferred| {
                assert!(!was_deferred);
                Ok(value * 10)
            },
            |err, _| err,
        );
        match result {
            MaybeDeferred::Immediate(Ok(value)) => assert_eq!(value, 20),
            _ => panic!("expected an immediate value"),
        }
    }

    #[test]
    fn test_immediate_err_runs_synchronously() {
        let input: MaybeDeferred<QueryResult<i32>> =
            MaybeDeferred::ready(Err(QueryError::Runner("bad".to_string())));
        let result = resolve_with(
            input,
            |_value: i32, _| Ok(0),
            |err, was_deferred| {
                assert!(!was_deferred);
                err
            },
        );
        match result {
            MaybeDeferred::Immediate(Err(err)) => {
                assert_eq!(err, QueryError::Runner("bad".to_string()))
            }
            _ => panic!("expected an immediate error"),
        }
    }

    #[tokio::test]
    async fn test_deferred_flags_handlers() {
        let input: MaybeDeferred<QueryResult<i32>> = MaybeDeferred::deferred(async { Ok(3) });
        let result = resolve_with(
            input,
            |value, was_deferred| {
                assert!(was_deferred);
                Ok(value + 1)
            },
            |err, _| err,
        );
        assert!(!result.is_immediate());
        assert_eq!(result.settle().await, Ok(4));
    }
}
