//! Four-state latch coalescing concurrent observers of one asynchronous result.
//!
//! A [`SharedPromise`] is not a bare future: it exposes its lifecycle
//! (`init -> loading -> resolved | rejected`) synchronously, settles at most
//! once, and invokes a single change callback on every transition. Any
//! number of callers may `wait()` on it; all of them observe the same
//! terminal outcome.

use std::sync::Mutex;

use tokio::sync::watch;

use crate::error::{QueryError, QueryResult};

/// Observable lifecycle of a [`SharedPromise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Init,
    Loading,
    Resolved,
    Rejected,
}

impl PromiseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromiseState::Init => "init",
            PromiseState::Loading => "loading",
            PromiseState::Resolved => "resolved",
            PromiseState::Rejected => "rejected",
        }
    }

    /// Resolved or rejected.
    pub fn is_settled(&self) -> bool {
        matches!(self, PromiseState::Resolved | PromiseState::Rejected)
    }
}

impl std::fmt::Display for PromiseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoked once per state transition, after the transition is visible.
pub type ChangeCallback = Box<dyn Fn(PromiseState) + Send + Sync>;

pub struct SharedPromise<T> {
    inner: Mutex<Inner<T>>,
    /// Wakes waiters on every transition; waiters re-check under the lock.
    signal: watch::Sender<PromiseState>,
    on_change: ChangeCallback,
}

struct Inner<T> {
    state: PromiseState,
    outcome: Option<QueryResult<T>>,
}

impl<T: Clone> SharedPromise<T> {
    pub fn new(on_change: ChangeCallback) -> Self {
        let (signal, _) = watch::channel(PromiseState::Init);
        Self {
            inner: Mutex::new(Inner {
                state: PromiseState::Init,
                outcome: None,
            }),
            signal,
            on_change,
        }
    }

    /// A latch that begins in `Resolved` with `value` (pre-seeded results).
    /// The change callback does not fire for the seeded state.
    pub fn resolved(value: T, on_change: ChangeCallback) -> Self {
        let (signal, _) = watch::channel(PromiseState::Resolved);
        Self {
            inner: Mutex::new(Inner {
                state: PromiseState::Resolved,
                outcome: Some(Ok(value)),
            }),
            signal,
            on_change,
        }
    }

    pub fn state(&self) -> PromiseState {
        self.inner.lock().unwrap().state
    }

    pub fn is_settled(&self) -> bool {
        self.state().is_settled()
    }

    /// The resolved value, if any.
    pub fn value(&self) -> Option<T> {
        match &self.inner.lock().unwrap().outcome {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection error, if any.
    pub fn error(&self) -> Option<QueryError> {
        match &self.inner.lock().unwrap().outcome {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    fn outcome(&self) -> Option<QueryResult<T>> {
        self.inner.lock().unwrap().outcome.clone()
    }

    /// `Init -> Loading`. A no-op (returning false) in any other state.
    pub fn start(&self) -> bool {
        self.transition(PromiseState::Init, PromiseState::Loading, None)
    }

    /// `Loading -> Resolved`. A no-op (returning false) in any other state.
    pub fn resolve(&self, value: T) -> bool {
        self.transition(PromiseState::Loading, PromiseState::Resolved, Some(Ok(value)))
    }

    /// `Loading -> Rejected`. A no-op (returning false) in any other state.
    pub fn reject(&self, error: QueryError) -> bool {
        self.transition(PromiseState::Loading, PromiseState::Rejected, Some(Err(error)))
    }

    fn transition(
        &self,
        from: PromiseState,
        to: PromiseState,
        outcome: Option<QueryResult<T>>,
    ) -> bool {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != from {
                return false;
            }
            inner.state = to;
            if outcome.is_some() {
                inner.outcome = outcome;
            }
        }
        // Wake waiters and notify after releasing the lock: the callback may
        // re-enter accessors on this promise.
        self.signal.send_replace(to);
        (self.on_change)(to);
        true
    }

    /// Awaits the terminal outcome, however many callers are waiting.
    ///
    /// Settles immediately when the promise is already terminal; otherwise
    /// suspends until `resolve` or `reject` runs.
    pub async fn wait(&self) -> QueryResult<T> {
        let mut rx = self.signal.subscribe();
        loop {
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            // The sender lives inside `self` and fires on every transition.
            let _ = rx.changed().await;
        }
    }
}
