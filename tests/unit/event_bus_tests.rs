//! Unit tests for the typed application event bus.

use tasksync::events::{AppEvent, EventBus, TaskChanged, TaskDeleted};
use tasksync::models::task::Task;

fn task(id: i64, project_id: Option<i64>) -> Task {
    Task {
        id,
        project_id,
        owner_id: Some(1),
        status: None,
        title: format!("task {id}"),
        description: None,
        start_date: None,
        due_date: None,
        created_at: None,
        updated_at: None,
    }
}

#[test]
fn publish_without_listeners_delivers_to_none() {
    let bus = EventBus::new();
    assert_eq!(bus.publish(AppEvent::TaskDeleted(TaskDeleted { task_id: 1 })), 0);
}

#[tokio::test]
async fn every_subscriber_receives_each_event() {
    let bus = EventBus::new();
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();
    assert_eq!(bus.listener_count(), 2);

    let delivered = bus.publish(AppEvent::TaskDeleted(TaskDeleted { task_id: 5 }));

    assert_eq!(delivered, 2);
    assert_eq!(a.recv().await.unwrap(), AppEvent::TaskDeleted(TaskDeleted { task_id: 5 }));
    assert_eq!(b.recv().await.unwrap(), AppEvent::TaskDeleted(TaskDeleted { task_id: 5 }));
}

#[test]
fn clones_share_one_channel() {
    let bus = EventBus::new();
    let clone = bus.clone();
    let mut rx = bus.subscribe();

    clone.publish(AppEvent::TaskDeleted(TaskDeleted { task_id: 3 }));

    assert!(rx.try_recv().is_ok());
}

#[test]
fn event_names_are_closed_set() {
    let changed = TaskChanged {
        task: task(1, None),
        is_personal_task: true,
    };
    assert_eq!(AppEvent::TaskCreated(changed.clone()).name(), "taskCreated");
    assert_eq!(AppEvent::TaskUpdated(changed).name(), "taskUpdated");
    assert_eq!(AppEvent::TaskDeleted(TaskDeleted { task_id: 1 }).name(), "taskDeleted");
}

/// Payloads serialize with camelCase names under the event name.
#[test]
fn event_wire_shape_uses_camel_case() {
    let event = AppEvent::TaskCreated(TaskChanged {
        task: task(7, Some(2)),
        is_personal_task: false,
    });
    let value = serde_json::to_value(&event).unwrap();

    assert_eq!(value["event"], "taskCreated");
    assert_eq!(value["detail"]["isPersonalTask"], false);
    assert_eq!(value["detail"]["task"]["projectId"], 2);

    let deleted = serde_json::to_value(AppEvent::TaskDeleted(TaskDeleted { task_id: 42 })).unwrap();
    assert_eq!(deleted["detail"]["taskId"], 42);
}
