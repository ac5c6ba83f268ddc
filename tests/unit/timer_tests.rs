//! Unit tests for the manual and tokio-backed schedulers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tasksync::timer::{ManualScheduler, Scheduler, TokioScheduler};

#[test]
fn manual_scheduler_runs_tasks_in_deadline_order() {
    let scheduler = ManualScheduler::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for (delay, label) in [(30, "c"), (10, "a"), (20, "b")] {
        let order = Arc::clone(&order);
        scheduler.schedule(
            Duration::from_millis(delay),
            Box::new(move || order.lock().unwrap().push(label)),
        );
    }

    scheduler.advance(Duration::from_millis(25));
    assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    assert_eq!(scheduler.pending(), 1);

    scheduler.advance(Duration::from_millis(5));
    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    assert_eq!(scheduler.now(), Duration::from_millis(30));
}

#[test]
fn cancelled_task_never_runs() {
    let scheduler = ManualScheduler::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let handle = scheduler.schedule(
        Duration::from_millis(5),
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    handle.cancel();
    handle.cancel();

    scheduler.advance(Duration::from_millis(10));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(handle.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn tokio_scheduler_fires_after_delay() {
    let scheduler = TokioScheduler::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    scheduler.schedule(
        Duration::from_secs(5),
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn tokio_scheduler_cancel_prevents_run() {
    let scheduler = TokioScheduler::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let handle = scheduler.schedule(
        Duration::from_secs(1),
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    handle.cancel();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn tokio_scheduler_without_runtime_drops_task() {
    let scheduler = TokioScheduler::default();
    let handle = scheduler.schedule(Duration::from_millis(1), Box::new(|| {}));
    assert!(handle.is_cancelled());
}
