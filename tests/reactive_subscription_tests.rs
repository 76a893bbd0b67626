//! Reactive subscription tests
//!
//! Covers:
//! - Deferred data fetches and the loading flags
//! - Exactly-once notification per facet transition
//! - DataReady events
//! - Fetch coalescing across concurrent waiters

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::StubRunner;
use sqlview::{Query, QueryEvent, QueryOptions};

#[tokio::test]
async fn test_deferred_data_notifies_once_per_transition() {
    let mut runner = StubRunner::users();
    runner.defer_data = true;
    let runner = Arc::new(runner);
    let q = Query::create("SELECT * FROM notify_users", runner, QueryOptions::default()).unwrap();

    let notifications = Arc::new(AtomicUsize::new(0));
    {
        let notifications = notifications.clone();
        q.subscribe(move |_| {
            notifications.fetch_add(1, Ordering::SeqCst);
        });
    }
    let ready_events = Arc::new(AtomicUsize::new(0));
    {
        let ready_events = ready_events.clone();
        q.on(QueryEvent::DataReady, move |_| {
            ready_events.fetch_add(1, Ordering::SeqCst);
        });
    }

    // index access starts the data fetch and yields the placeholder
    assert!(q.get(0).is_some());
    assert!(q.data_loading());
    assert_eq!(notifications.load(Ordering::SeqCst), 1); // data promise (loading)

    let rows = q.fetch().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(q.data_loaded());
    assert!(!q.data_loading());
    assert!(q.ready());
    assert_eq!(notifications.load(Ordering::SeqCst), 2); // + data promise (resolved)
    assert_eq!(ready_events.load(Ordering::SeqCst), 1);

    // settled facets publish nothing further
    let _ = q.fetch().await.unwrap();
    assert_eq!(notifications.load(Ordering::SeqCst), 2);
    assert_eq!(ready_events.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_waiters_share_one_fetch() {
    let mut runner = StubRunner::users();
    runner.defer_data = true;
    let runner = Arc::new(runner);
    let q = Query::create(
        "SELECT * FROM coalesced_users",
        runner.clone(),
        QueryOptions::default(),
    )
    .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let q = q.clone();
        handles.push(tokio::spawn(
            async move { q.fetch().await.map(|rows| rows.len()) },
        ));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Ok(2));
    }
    assert_eq!(runner.data_calls(), 1);
}

#[test]
fn test_unsubscribe_stops_notifications() {
    let runner = Arc::new(StubRunner::users());
    let q = Query::create("SELECT * FROM unsub_users", runner, QueryOptions::default()).unwrap();
    let notifications = Arc::new(AtomicUsize::new(0));
    let id = {
        let notifications = notifications.clone();
        q.subscribe(move |_| {
            notifications.fetch_add(1, Ordering::SeqCst);
        })
    };
    let _ = q.iter(); // data promise: loading then resolved
    assert_eq!(notifications.load(Ordering::SeqCst), 2);
    assert!(q.unsubscribe(id));
    assert!(!q.unsubscribe(id));
}

#[test]
fn test_subscribers_observe_a_live_value() {
    let runner = Arc::new(StubRunner::users());
    let q = Query::create("SELECT * FROM live_users", runner, QueryOptions::default()).unwrap();
    let loaded_states = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let loaded_states = loaded_states.clone();
        q.subscribe(move |query| {
            loaded_states.lock().unwrap().push(query.data_loaded());
        });
    }
    let _ = q.iter();
    // first notification during loading, second after resolution
    assert_eq!(*loaded_states.lock().unwrap(), vec![false, true]);
}

#[test]
fn test_event_listener_aliases() {
    let runner = Arc::new(StubRunner::users());
    let q = Query::create("SELECT * FROM alias_users", runner, QueryOptions::default()).unwrap();
    let ready_events = Arc::new(AtomicUsize::new(0));
    let id = {
        let ready_events = ready_events.clone();
        q.add_event_listener(QueryEvent::DataReady, move |_| {
            ready_events.fetch_add(1, Ordering::SeqCst);
        })
    };
    let _ = q.iter();
    assert_eq!(ready_events.load(Ordering::SeqCst), 1);
    assert!(q.remove_event_listener(QueryEvent::DataReady, id));
    assert!(!q.off(QueryEvent::DataReady, id));
}
