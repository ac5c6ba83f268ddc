//! Application-wide broadcast events.
//!
//! Views that derive state the cache cannot express as a key (for example a
//! calendar recomputing visible date ranges) subscribe here instead of
//! depending on the code that performed a mutation. Delivery is
//! fire-and-forget: no acknowledgement, and a listener that falls more than
//! the channel capacity behind skips the oldest events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::task::Task;

/// Broadcast channel capacity.
pub const CHANNEL_CAPACITY: usize = 64;

/// Closed set of application events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "detail", rename_all = "camelCase")]
pub enum AppEvent {
    /// A task was created and the cache has been invalidated.
    TaskCreated(TaskChanged),
    /// A task was updated and the cache has been invalidated.
    TaskUpdated(TaskChanged),
    /// A task was deleted and the cache has been invalidated.
    TaskDeleted(TaskDeleted),
}

impl AppEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskCreated(_) => "taskCreated",
            Self::TaskUpdated(_) => "taskUpdated",
            Self::TaskDeleted(_) => "taskDeleted",
        }
    }
}

/// Payload of [`AppEvent::TaskCreated`] and [`AppEvent::TaskUpdated`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskChanged {
    /// Task as confirmed by the server.
    pub task: Task,
    /// Whether the task has no owning project.
    pub is_personal_task: bool,
}

/// Payload of [`AppEvent::TaskDeleted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDeleted {
    /// Identifier of the deleted task.
    pub task_id: i64,
}

/// Typed publish/subscribe bus for [`AppEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with [`CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Attach a listener.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; returns how many listeners received it.
    pub fn publish(&self, event: AppEvent) -> usize {
        let name = event.name();
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!(event = name, delivered, "app event published");
        delivered
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
