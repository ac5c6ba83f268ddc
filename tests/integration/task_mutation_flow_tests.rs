//! Integration tests for task mutations: cache invalidation and event
//! broadcast happen only after the network call succeeds.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;

use tasksync::cache::{CacheEvent, QueryCache, QueryKey};
use tasksync::coordinator::{
    calendar_key, project_tasks_key, task_key, TaskMutations, PERSONAL_CALENDAR_LABEL, PERSONAL_TASKS,
    PROJECTS,
};
use tasksync::events::{AppEvent, EventBus, TaskDeleted};
use tasksync::models::task::{Task, TaskDraft, UpdateTaskRequest};
use tasksync::AppError;

use super::test_helpers::FakeTaskApi;

struct Fixture {
    mutations: TaskMutations,
    cache: Arc<QueryCache>,
    cache_events: broadcast::Receiver<CacheEvent>,
    bus_events: broadcast::Receiver<AppEvent>,
}

/// Seed one entry per partition the coordinator touches, then start
/// listening so seeding does not show up as events.
fn fixture(api: Arc<FakeTaskApi>) -> Fixture {
    let cache = QueryCache::new();
    for key in seeded_keys() {
        cache.set_data(key, json!([]));
    }
    cache.set_data(task_key(42), json!({"id": 42}));

    let bus = EventBus::new();
    let cache_events = cache.subscribe();
    let bus_events = bus.subscribe();
    Fixture {
        mutations: TaskMutations::new(api, Arc::clone(&cache), bus),
        cache,
        cache_events,
        bus_events,
    }
}

fn seeded_keys() -> Vec<QueryKey> {
    vec![
        calendar_key(1, PERSONAL_CALENDAR_LABEL),
        calendar_key(1, "Team Alpha"),
        calendar_key(2, PERSONAL_CALENDAR_LABEL),
        QueryKey::new(PROJECTS),
        QueryKey::new(PERSONAL_TASKS),
        project_tasks_key(3),
    ]
}

fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

fn draft(project_id: Option<i64>) -> TaskDraft {
    TaskDraft {
        title: Some("Write report".into()),
        project_id,
        ..TaskDraft::default()
    }
}

// ── Rejected mutations ──────────────────────────────────────────────────────

/// A rejected call returns its error unchanged and leaves no trace in the
/// cache or on the bus.
#[tokio::test]
async fn rejected_mutations_touch_nothing() {
    let err = AppError::Http("422 Unprocessable Entity: title is required".into());
    let mut fx = fixture(FakeTaskApi::failing(err.clone()));

    assert_eq!(fx.mutations.create_task(draft(None), false).await.unwrap_err(), err);
    assert_eq!(
        fx.mutations
            .update_task(UpdateTaskRequest {
                task_id: 42,
                changes: draft(Some(3)),
            })
            .await
            .unwrap_err(),
        err
    );
    assert_eq!(fx.mutations.delete_task(42).await.unwrap_err(), err);

    assert!(drain(&mut fx.cache_events).is_empty());
    assert!(drain(&mut fx.bus_events).is_empty());
    for key in seeded_keys() {
        assert!(!fx.cache.state(&key).unwrap().stale, "{key} went stale");
    }
    assert_eq!(fx.cache.get(&task_key(42)), Some(json!({"id": 42})));
}

// ── Create ──────────────────────────────────────────────────────────────────

/// Creating a personal task invalidates every task partition and announces
/// the task as personal.
#[tokio::test]
async fn create_personal_task_invalidates_and_broadcasts() {
    let api = FakeTaskApi::new();
    let mut fx = fixture(Arc::clone(&api));

    let task = fx.mutations.create_task(draft(None), false).await.unwrap();

    assert_eq!(api.calls(), vec!["create"]);
    for key in seeded_keys() {
        assert!(fx.cache.state(&key).unwrap().stale, "{key} not invalidated");
    }
    assert!(!fx.cache.state(&task_key(42)).unwrap().stale);

    let AppEvent::TaskCreated(changed) = fx.bus_events.try_recv().unwrap() else {
        panic!("expected taskCreated");
    };
    assert_eq!(changed.task, task);
    assert!(changed.is_personal_task);
}

/// Project id `0` counts as personal; a positive id does not.
#[tokio::test]
async fn personal_flag_follows_project_id() {
    for (project_id, expected) in [(None, true), (Some(0), true), (Some(5), false)] {
        let mut fx = fixture(FakeTaskApi::new());
        fx.mutations.create_task(draft(project_id), false).await.unwrap();

        let AppEvent::TaskCreated(changed) = fx.bus_events.try_recv().unwrap() else {
            panic!("expected taskCreated");
        };
        assert_eq!(changed.is_personal_task, expected, "project_id {project_id:?}");
    }
}

#[tokio::test]
async fn create_on_behalf_of_owner_uses_owner_endpoint() {
    let api = FakeTaskApi::new();
    let fx = fixture(Arc::clone(&api));

    let task = fx
        .mutations
        .create_task(
            TaskDraft {
                owner_id: Some(9),
                ..draft(Some(3))
            },
            true,
        )
        .await
        .unwrap();

    assert_eq!(api.calls(), vec!["create_with_owner"]);
    assert_eq!(task.owner_id, Some(9));
}

/// Invalidation is published before the domain event.
#[tokio::test]
async fn cache_events_precede_bus_event() {
    let mut fx = fixture(FakeTaskApi::new());

    fx.mutations.create_task(draft(Some(3)), false).await.unwrap();

    let invalidated: Vec<QueryKey> = drain(&mut fx.cache_events)
        .into_iter()
        .filter_map(|event| match event {
            CacheEvent::Invalidated(key) => Some(key),
            _ => None,
        })
        .collect();
    assert!(invalidated.contains(&QueryKey::new(PROJECTS)));
    assert!(invalidated.contains(&project_tasks_key(3)));
    assert_eq!(drain(&mut fx.bus_events).len(), 1);
}

// ── Update ──────────────────────────────────────────────────────────────────

/// The confirmed task lands in its detail slot before the broadcast.
#[tokio::test]
async fn update_writes_detail_slot() {
    let api = FakeTaskApi::new();
    let mut fx = fixture(Arc::clone(&api));

    let task = fx
        .mutations
        .update_task(UpdateTaskRequest {
            task_id: 42,
            changes: draft(Some(3)),
        })
        .await
        .unwrap();

    assert_eq!(api.calls(), vec!["update 42"]);
    let cached: Task = fx.cache.get_as(&task_key(42)).unwrap().unwrap();
    assert_eq!(cached, task);
    assert!(!fx.cache.state(&task_key(42)).unwrap().stale);

    let AppEvent::TaskUpdated(changed) = fx.bus_events.try_recv().unwrap() else {
        panic!("expected taskUpdated");
    };
    assert!(!changed.is_personal_task);
}

/// A personal update also runs the narrower pass over personal calendars,
/// so those are invalidated twice while other calendars are invalidated once.
#[tokio::test]
async fn personal_update_revisits_personal_calendars() {
    let mut fx = fixture(FakeTaskApi::new());

    fx.mutations
        .update_task(UpdateTaskRequest {
            task_id: 42,
            changes: draft(None),
        })
        .await
        .unwrap();

    let invalidations = |key: &QueryKey, events: &[CacheEvent]| {
        events
            .iter()
            .filter(|e| **e == CacheEvent::Invalidated(key.clone()))
            .count()
    };
    let events = drain(&mut fx.cache_events);
    assert_eq!(invalidations(&calendar_key(1, PERSONAL_CALENDAR_LABEL), &events), 2);
    assert_eq!(invalidations(&calendar_key(2, PERSONAL_CALENDAR_LABEL), &events), 2);
    assert_eq!(invalidations(&calendar_key(1, "Team Alpha"), &events), 1);
}

// ── Delete ──────────────────────────────────────────────────────────────────

/// Deleting drops the detail slot and every calendar partition, invalidates
/// the rest, and publishes exactly one `taskDeleted`.
#[tokio::test]
async fn delete_removes_slot_and_calendars() {
    let api = FakeTaskApi::new();
    let mut fx = fixture(Arc::clone(&api));

    fx.mutations.delete_task(42).await.unwrap();

    assert_eq!(api.calls(), vec!["delete 42"]);
    assert!(!fx.cache.contains(&task_key(42)));
    assert!(!fx.cache.contains(&calendar_key(1, PERSONAL_CALENDAR_LABEL)));
    assert!(!fx.cache.contains(&calendar_key(1, "Team Alpha")));
    assert!(!fx.cache.contains(&calendar_key(2, PERSONAL_CALENDAR_LABEL)));
    assert!(fx.cache.state(&QueryKey::new(PROJECTS)).unwrap().stale);
    assert!(fx.cache.state(&project_tasks_key(3)).unwrap().stale);

    let events = drain(&mut fx.bus_events);
    assert_eq!(events, vec![AppEvent::TaskDeleted(TaskDeleted { task_id: 42 })]);
}
