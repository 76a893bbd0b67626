//! Store and emitter facets of a query value.
//!
//! Subscribers observe every facet state transition; event handlers observe
//! the discrete notifications (`DataReady`, `Error`). Both registries are
//! id-keyed so callbacks can be removed without keeping handles into the
//! closures, and both are snapshotted before invocation so a callback may
//! re-enter the query without deadlocking.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::QueryError;

use super::Query;

/// Discrete notifications emitted by a query value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryEvent {
    /// The data facet resolved.
    DataReady,
    /// The sticky terminal error was set.
    Error,
    /// Reserved; never emitted.
    HighScore,
}

/// Payload delivered to event handlers.
#[derive(Debug, Clone)]
pub enum EventPayload {
    None,
    Error(QueryError),
}

pub(crate) type SubscriberFn = Arc<dyn Fn(&Query) + Send + Sync>;
pub(crate) type HandlerFn = Arc<dyn Fn(&EventPayload) + Send + Sync>;

impl Query {
    /// Registers `callback` for every state transition of this value.
    ///
    /// The callback receives the query itself and must treat it as live:
    /// facet states may have advanced again by the time it runs. Returns
    /// an id for [`Query::unsubscribe`].
    pub fn subscribe<F>(&self, callback: F) -> usize
    where
        F: Fn(&Query) + Send + Sync + 'static,
    {
        let id = self.inner.next_callback_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes a subscriber; returns whether anything was removed.
    pub fn unsubscribe(&self, id: usize) -> bool {
        let mut subscribers = self.inner.subscribers.lock().unwrap();
        let before = subscribers.len();
        subscribers.retain(|(subscriber_id, _)| *subscriber_id != id);
        subscribers.len() < before
    }

    /// Registers `callback` for `event`. Returns an id for [`Query::off`].
    pub fn on<F>(&self, event: QueryEvent, callback: F) -> usize
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let id = self.inner.next_callback_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .unwrap()
            .entry(event)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes an event handler; returns whether anything was removed.
    pub fn off(&self, event: QueryEvent, id: usize) -> bool {
        let mut handlers = self.inner.handlers.lock().unwrap();
        match handlers.get_mut(&event) {
            Some(list) => {
                let before = list.len();
                list.retain(|(handler_id, _)| *handler_id != id);
                list.len() < before
            }
            None => false,
        }
    }

    /// Alias of [`Query::on`].
    pub fn add_event_listener<F>(&self, event: QueryEvent, callback: F) -> usize
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.on(event, callback)
    }

    /// Alias of [`Query::off`].
    pub fn remove_event_listener(&self, event: QueryEvent, id: usize) -> bool {
        self.off(event, id)
    }

    /// Delivers the query to every subscriber.
    ///
    /// `source` names the transition for tracing. Trips the runaway guard
    /// when a subscriber keeps the value transitioning forever.
    pub(crate) fn publish(&self, source: &str) {
        let count = self.inner.publish_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count > super::MAX_PUBLICATIONS {
            panic!(
                "query {} published {} times; a subscriber is likely mutating it in a loop",
                self.inner.id, count
            );
        }
        tracing::trace!(query = %self.inner.id, source, "publish");
        let subscribers: Vec<SubscriberFn> = self
            .inner
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in subscribers {
            callback(self);
        }
    }

    pub(crate) fn emit(&self, event: QueryEvent, payload: EventPayload) {
        let handlers: Vec<HandlerFn> = self
            .inner
            .handlers
            .lock()
            .unwrap()
            .get(&event)
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(&payload);
        }
    }
}
