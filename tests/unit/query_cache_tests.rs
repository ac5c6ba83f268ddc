//! Unit tests for the query cache: writes, removal, invalidation, refetch,
//! and discarding of superseded fetch results.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{broadcast, oneshot, Mutex};

use tasksync::cache::{CacheEvent, FetchFuture, Fetcher, QueryCache, QueryFilter, QueryKey, RefetchType};
use tasksync::query_key;

fn counting_fetcher(value: Value) -> (Fetcher, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let fetcher: Fetcher = Arc::new(move || -> FetchFuture {
        counter.fetch_add(1, Ordering::SeqCst);
        let value = value.clone();
        Box::pin(async move { Ok(value) })
    });
    (fetcher, calls)
}

async fn next_event(rx: &mut broadcast::Receiver<CacheEvent>) -> CacheEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("cache event within 1s")
        .expect("event channel open")
}

async fn wait_for_update(rx: &mut broadcast::Receiver<CacheEvent>, key: &QueryKey) {
    loop {
        if next_event(rx).await == CacheEvent::Updated(key.clone()) {
            return;
        }
    }
}

// ── Writes and removal ──────────────────────────────────────────────────────

#[test]
fn set_data_stores_value_and_clears_stale() {
    let cache = QueryCache::new();
    let key = query_key!["task", 1_i64];

    cache.set_data(key.clone(), json!({"id": 1}));

    assert_eq!(cache.get(&key), Some(json!({"id": 1})));
    let state = cache.state(&key).unwrap();
    assert!(!state.stale);
    assert!(state.updated_at.is_some());
}

#[test]
fn set_as_and_get_as_round_trip_typed_values() {
    let cache = QueryCache::new();
    let key = query_key!["projects"];

    cache.set_as(key.clone(), &vec![1_i64, 2, 3]).unwrap();

    let back: Option<Vec<i64>> = cache.get_as(&key).unwrap();
    assert_eq!(back, Some(vec![1, 2, 3]));
}

#[test]
fn remove_reports_presence_and_emits_event() {
    let cache = QueryCache::new();
    let mut rx = cache.subscribe();
    let key = query_key!["task", 9_i64];
    cache.set_data(key.clone(), json!(null));

    assert!(cache.remove(&key));
    assert!(!cache.remove(&key), "second removal finds nothing");

    assert_eq!(rx.try_recv().unwrap(), CacheEvent::Updated(key.clone()));
    assert_eq!(rx.try_recv().unwrap(), CacheEvent::Removed(key));
    assert!(rx.try_recv().is_err(), "no event for a missing key");
}

#[test]
fn remove_queries_drops_every_match() {
    let cache = QueryCache::new();
    cache.set_data(query_key!["calendar-tasks", 1_i64, "A"], json!([]));
    cache.set_data(query_key!["calendar-tasks", 2_i64, "B"], json!([]));
    cache.set_data(query_key!["projects"], json!([]));

    let removed = cache.remove_queries(&QueryFilter::prefix(QueryKey::new("calendar-tasks")));

    assert_eq!(removed.len(), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(&query_key!["projects"]));
}

// ── Invalidation ────────────────────────────────────────────────────────────

#[test]
fn invalidate_marks_stale_and_bumps_generation() {
    let cache = QueryCache::new();
    let key = query_key!["personal-tasks"];
    cache.set_data(key.clone(), json!([]));
    let before = cache.state(&key).unwrap().generation;

    let hit = cache.invalidate_queries(&QueryFilter::exact(key.clone()), RefetchType::None);

    assert_eq!(hit, vec![key.clone()]);
    let state = cache.state(&key).unwrap();
    assert!(state.stale);
    assert_eq!(state.generation, before + 1);
    assert_eq!(cache.get(&key), Some(json!([])), "stale data stays readable");
}

/// Invalidating twice is harmless.
#[test]
fn invalidation_is_idempotent() {
    let cache = QueryCache::new();
    let key = query_key!["projects"];
    cache.set_data(key.clone(), json!([]));
    let filter = QueryFilter::prefix(key.clone());

    cache.invalidate_queries(&filter, RefetchType::None);
    cache.invalidate_queries(&filter, RefetchType::None);

    assert!(cache.state(&key).unwrap().stale);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn invalidate_all_refetches_inactive_entries() {
    let cache = QueryCache::new();
    let key = query_key!["project-tasks", 4_i64];
    let (fetcher, calls) = counting_fetcher(json!(["fresh"]));
    let mut rx = cache.subscribe();

    let observer = cache.observe(key.clone(), fetcher);
    wait_for_update(&mut rx, &key).await;
    drop(observer);
    assert_eq!(cache.state(&key).unwrap().observers, 0);

    cache.invalidate_queries(&QueryFilter::prefix(QueryKey::new("project-tasks")), RefetchType::All);
    wait_for_update(&mut rx, &key).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!cache.state(&key).unwrap().stale);
}

#[tokio::test]
async fn invalidate_active_skips_unobserved_entries() {
    let cache = QueryCache::new();
    let key = query_key!["projects"];
    let (fetcher, calls) = counting_fetcher(json!([]));
    let mut rx = cache.subscribe();

    drop(cache.observe(key.clone(), fetcher));
    wait_for_update(&mut rx, &key).await;

    cache.invalidate_queries(&QueryFilter::exact(key.clone()), RefetchType::Active);
    tokio::task::yield_now().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.state(&key).unwrap().stale);
}

/// A fetch that resolves after a newer invalidation is discarded.
#[tokio::test]
async fn superseded_fetch_result_is_dropped() {
    let cache = QueryCache::new();
    let key = query_key!["personal-tasks"];
    let gates: Arc<Mutex<Vec<oneshot::Receiver<Value>>>> = Arc::default();
    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();
    gates.lock().await.extend([first_rx, second_rx]);

    let queue = Arc::clone(&gates);
    let fetcher: Fetcher = Arc::new(move || -> FetchFuture {
        let queue = Arc::clone(&queue);
        Box::pin(async move {
            let gate = queue.lock().await.remove(0);
            Ok(gate.await.unwrap_or(Value::Null))
        })
    });

    let mut rx = cache.subscribe();
    let _observer = cache.observe(key.clone(), fetcher);
    tokio::task::yield_now().await;
    cache.invalidate_queries(&QueryFilter::exact(key.clone()), RefetchType::All);
    tokio::task::yield_now().await;

    second_tx.send(json!("new")).unwrap();
    wait_for_update(&mut rx, &key).await;
    first_tx.send(json!("old")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(cache.get(&key), Some(json!("new")));
}

#[tokio::test]
async fn fetch_without_fetcher_is_not_found() {
    let cache = QueryCache::new();
    let err = cache.fetch(&query_key!["nothing"]).await.unwrap_err();
    assert!(err.to_string().starts_with("not found:"));
}

#[tokio::test]
async fn observer_count_tracks_guards() {
    let cache = QueryCache::new();
    let key = query_key!["projects"];
    let (fetcher, _) = counting_fetcher(json!([]));

    let a = cache.observe(key.clone(), Arc::clone(&fetcher));
    let b = cache.observe(key.clone(), fetcher);
    assert_eq!(cache.state(&key).unwrap().observers, 2);

    drop(a);
    assert_eq!(cache.state(&key).unwrap().observers, 1);
    drop(b);
    assert_eq!(cache.state(&key).unwrap().observers, 0);
}
