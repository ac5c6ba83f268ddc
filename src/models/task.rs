//! Task entity as returned by the REST service.
//!
//! The synchronization layer never owns task bodies; it only needs enough
//! of the shape to classify a task as personal or project-scoped.

use serde::{Deserialize, Serialize};

/// A task as returned by the create/update endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Server-assigned identifier.
    pub id: i64,
    /// Owning project; `None` or `0` marks a personal task.
    #[serde(default)]
    pub project_id: Option<i64>,
    /// Owning user.
    #[serde(default)]
    pub owner_id: Option<i64>,
    /// Workflow status label (e.g. `TODO`, `IN_PROGRESS`, `DONE`).
    #[serde(default)]
    pub status: Option<String>,
    /// Short title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Scheduled start, as sent by the server.
    #[serde(default)]
    pub start_date: Option<String>,
    /// Due date, as sent by the server.
    #[serde(default)]
    pub due_date: Option<String>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last modification timestamp.
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Task {
    /// Whether the task belongs to no project.
    #[must_use]
    pub fn is_personal(&self) -> bool {
        self.project_id.is_none_or(|id| id == 0)
    }
}

/// Fields accepted by the create and update endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Short title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Workflow status label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Target project; omit for a personal task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    /// Owner the task is created on behalf of.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    /// Scheduled start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Due date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

/// Update request: the target task and the fields to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTaskRequest {
    /// Task being updated.
    pub task_id: i64,
    /// Fields to change.
    pub changes: TaskDraft,
}
