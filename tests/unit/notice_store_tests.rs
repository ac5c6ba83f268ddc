//! Unit tests for the bounded notice queue.
//!
//! Covers capacity eviction, dismissal scheduling (at most one pending
//! removal per id), listener fan-out, and no-op transitions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tasksync::config::NoticeConfig;
use tasksync::models::notice::{NoticeInput, NoticePatch, NoticeVariant};
use tasksync::notice::{NoticeAction, NoticeSnapshot, NoticeStore};
use tasksync::timer::ManualScheduler;

const DELAY: Duration = Duration::from_millis(1_000_000);

fn store_with(limit: usize) -> (Arc<NoticeStore>, ManualScheduler) {
    let scheduler = ManualScheduler::new();
    let store = NoticeStore::new(
        NoticeConfig {
            limit,
            remove_delay_ms: 1_000_000,
        },
        Arc::new(scheduler.clone()),
    );
    (store, scheduler)
}

fn titles(snapshot: &NoticeSnapshot) -> Vec<String> {
    snapshot
        .iter()
        .map(|n| n.title.clone().unwrap_or_default())
        .collect()
}

// ── Capacity ────────────────────────────────────────────────────────────────

/// With capacity 1, the last pushed notice always wins.
#[test]
fn capacity_one_keeps_latest_notice() {
    let (store, _) = store_with(1);

    store.push(NoticeInput::titled("A"));
    store.push(NoticeInput::titled("B"));

    assert_eq!(titles(&store.snapshot()), vec!["B"]);
}

/// Pushing more than N notices keeps exactly the N most recent, newest first.
#[test]
fn pushing_past_capacity_keeps_most_recent() {
    let (store, _) = store_with(3);

    for title in ["1", "2", "3", "4", "5"] {
        store.push(NoticeInput::titled(title));
    }

    assert_eq!(titles(&store.snapshot()), vec!["5", "4", "3"]);
}

/// Evicting a dismissed notice cancels its pending removal.
#[test]
fn eviction_cancels_pending_removal() {
    let (store, scheduler) = store_with(1);

    let first = store.push(NoticeInput::titled("A"));
    first.dismiss();
    assert_eq!(scheduler.pending(), 1);

    store.push(NoticeInput::titled("B"));

    assert_eq!(scheduler.pending(), 0, "evicted notice's timer must be cancelled");
    assert_eq!(store.pending_removals(), 0);
}

// ── Dismissal ───────────────────────────────────────────────────────────────

/// Push A then B on a capacity-1 queue, dismiss B, and advance past the
/// delay: the queue ends empty.
#[test]
fn dismiss_then_delay_empties_queue() {
    let (store, scheduler) = store_with(1);

    store.push(NoticeInput::titled("A"));
    let b = store.push(NoticeInput::titled("B"));

    b.dismiss();
    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot[0].open, "dismissed notice stays until removal fires");

    scheduler.advance(DELAY - Duration::from_millis(1));
    assert_eq!(store.snapshot().len(), 1, "removal must not fire early");

    scheduler.advance(Duration::from_millis(1));
    assert!(store.snapshot().is_empty());
}

/// Dismissing the same id repeatedly schedules exactly one removal.
#[test]
fn repeated_dismiss_schedules_one_removal() {
    let (store, scheduler) = store_with(1);
    let handle = store.push(NoticeInput::titled("A"));

    let removals = Arc::new(Mutex::new(0_usize));
    let seen = Arc::clone(&removals);
    let _sub = store.subscribe(move |snapshot: &NoticeSnapshot| {
        if snapshot.is_empty() {
            *seen.lock().unwrap() += 1;
        }
    });

    for _ in 0..5 {
        handle.dismiss();
    }
    assert_eq!(scheduler.pending(), 1);

    scheduler.advance(DELAY * 2);

    assert_eq!(*removals.lock().unwrap(), 1);
    assert_eq!(scheduler.pending(), 0);
}

/// A later dismiss of the same id does not push the removal out.
#[test]
fn repeated_dismiss_keeps_first_deadline() {
    let (store, scheduler) = store_with(1);
    let handle = store.push(NoticeInput::titled("A"));

    handle.dismiss();
    scheduler.advance(DELAY / 2);
    handle.dismiss();
    scheduler.advance(DELAY / 2);

    assert!(store.snapshot().is_empty(), "removal fires at the first deadline");
}

/// Dismissing all notices closes every one and schedules one removal each.
#[test]
fn dismiss_all_closes_every_notice() {
    let (store, scheduler) = store_with(3);
    store.push(NoticeInput::titled("A"));
    store.push(NoticeInput::titled("B"));

    store.dismiss(None);

    assert!(store.snapshot().iter().all(|n| !n.open));
    assert_eq!(scheduler.pending(), 2);

    scheduler.advance(DELAY);
    assert!(store.snapshot().is_empty());
}

/// `set_open(id, false)` is a dismissal; `set_open(id, true)` is ignored.
#[test]
fn set_open_false_dismisses() {
    let (store, scheduler) = store_with(1);
    let handle = store.push(NoticeInput::titled("A"));

    store.set_open(handle.id(), true);
    assert_eq!(scheduler.pending(), 0);

    store.set_open(handle.id(), false);
    assert!(!store.snapshot()[0].open);
    assert_eq!(scheduler.pending(), 1);
}

/// Removing a dismissed notice cancels its pending timer.
#[test]
fn remove_cancels_pending_removal() {
    let (store, scheduler) = store_with(1);
    let handle = store.push(NoticeInput::titled("A"));
    handle.dismiss();

    store.remove(Some(handle.id()));

    assert!(store.snapshot().is_empty());
    assert_eq!(scheduler.pending(), 0);
}

// ── Updates and no-ops ──────────────────────────────────────────────────────

/// Updating a notice merges only the provided fields.
#[test]
fn update_merges_patch() {
    let (store, _) = store_with(1);
    let handle = store.push(NoticeInput::titled("Saving").with_description("please wait"));

    handle.update(NoticePatch {
        title: Some("Failed".into()),
        variant: Some(NoticeVariant::Destructive),
        ..NoticePatch::default()
    });

    let notice = &store.snapshot()[0];
    assert_eq!(notice.title.as_deref(), Some("Failed"));
    assert_eq!(notice.description.as_deref(), Some("please wait"));
    assert_eq!(notice.variant, NoticeVariant::Destructive);
}

/// An update for an unknown id leaves the snapshot pointer-equal and does
/// not notify listeners.
#[test]
fn update_unknown_id_is_silent_noop() {
    let (store, _) = store_with(1);
    store.push(NoticeInput::titled("A"));
    let before = store.snapshot();

    let calls = Arc::new(Mutex::new(0_usize));
    let seen = Arc::clone(&calls);
    let _sub = store.subscribe(move |_: &NoticeSnapshot| *seen.lock().unwrap() += 1);

    store.dispatch(NoticeAction::Update {
        id: "missing".into(),
        patch: NoticePatch {
            title: Some("X".into()),
            ..NoticePatch::default()
        },
    });

    assert!(Arc::ptr_eq(&before, &store.snapshot()));
    assert_eq!(*calls.lock().unwrap(), 0);
}

/// Removing an unknown id does not notify listeners.
#[test]
fn remove_unknown_id_is_silent_noop() {
    let (store, _) = store_with(1);
    let calls = Arc::new(Mutex::new(0_usize));
    let seen = Arc::clone(&calls);
    let _sub = store.subscribe(move |_: &NoticeSnapshot| *seen.lock().unwrap() += 1);

    store.remove(Some("42"));

    assert_eq!(*calls.lock().unwrap(), 0);
}

// ── Listeners ───────────────────────────────────────────────────────────────

/// Every listener receives the same snapshot for a transition.
#[test]
fn listeners_receive_pointer_equal_snapshot() {
    let (store, _) = store_with(1);
    let first: Arc<Mutex<Option<NoticeSnapshot>>> = Arc::default();
    let second: Arc<Mutex<Option<NoticeSnapshot>>> = Arc::default();

    let a = Arc::clone(&first);
    let _sub_a = store.subscribe(move |s: &NoticeSnapshot| *a.lock().unwrap() = Some(Arc::clone(s)));
    let b = Arc::clone(&second);
    let _sub_b = store.subscribe(move |s: &NoticeSnapshot| *b.lock().unwrap() = Some(Arc::clone(s)));

    store.push(NoticeInput::titled("A"));

    let first = first.lock().unwrap().clone().expect("first listener called");
    let second = second.lock().unwrap().clone().expect("second listener called");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &store.snapshot()));
}

/// Dropping a subscription detaches the listener.
#[test]
fn dropping_subscription_unsubscribes() {
    let (store, _) = store_with(1);
    let calls = Arc::new(Mutex::new(0_usize));
    let seen = Arc::clone(&calls);
    let sub = store.subscribe(move |_: &NoticeSnapshot| *seen.lock().unwrap() += 1);
    assert_eq!(store.listener_count(), 1);

    store.push(NoticeInput::titled("A"));
    drop(sub);
    store.push(NoticeInput::titled("B"));

    assert_eq!(store.listener_count(), 0);
    assert_eq!(*calls.lock().unwrap(), 1);
}

/// A push made from inside a listener is delivered after the current
/// snapshot reaches every listener, so the last snapshot each listener
/// sees is the latest state.
#[test]
fn reentrant_push_is_delivered_in_order() {
    let (store, _) = store_with(2);
    let weak = Arc::downgrade(&store);
    let _pusher = store.subscribe(move |s: &NoticeSnapshot| {
        if titles(s) == ["A"] {
            if let Some(store) = weak.upgrade() {
                store.push(NoticeInput::titled("B"));
            }
        }
    });
    let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
    let log = Arc::clone(&seen);
    let _recorder = store.subscribe(move |s: &NoticeSnapshot| log.lock().unwrap().push(titles(s)));

    store.push(NoticeInput::titled("A"));

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![vec!["A".to_owned()], vec!["B".to_owned(), "A".to_owned()]]);
    assert_eq!(titles(&store.snapshot()), ["B", "A"]);
}

/// Ids are unique among notices pushed on one store.
#[test]
fn push_assigns_distinct_ids() {
    let (store, _) = store_with(5);
    let a = store.push(NoticeInput::titled("A"));
    let b = store.push(NoticeInput::titled("B"));
    assert_ne!(a.id(), b.id());
}
