//! Task mutations with post-commit cache invalidation and event broadcast.
//!
//! Every mutation follows the same shape: perform the network call, and only
//! after it resolves successfully touch the cache and then publish an
//! [`AppEvent`]. A rejected call leaves the cache untouched, publishes
//! nothing, and returns the error unchanged.
//!
//! Several views hold partitions derived from overlapping server queries:
//!
//! | Key                                   | View                          |
//! |---------------------------------------|-------------------------------|
//! | `["calendar-tasks", owner, label]`    | calendar, one per scope label |
//! | `["projects"]`                        | project list with counters    |
//! | `["personal-tasks"]`                  | personal task list            |
//! | `["project-tasks", project_id]`       | project board                 |
//! | `["task", id]`                        | single-task detail            |

use std::sync::Arc;

use tracing::{info, info_span, Instrument};

use crate::api::TaskApi;
use crate::cache::{KeyMatcher, QueryCache, QueryFilter, QueryKey, RefetchType};
use crate::events::{AppEvent, EventBus, TaskChanged, TaskDeleted};
use crate::models::task::{Task, TaskDraft, UpdateTaskRequest};
use crate::Result;

/// Calendar partitions, keyed by owner and scope label.
pub const CALENDAR_TASKS: &str = "calendar-tasks";
/// Project list partition.
pub const PROJECTS: &str = "projects";
/// Personal task list partition.
pub const PERSONAL_TASKS: &str = "personal-tasks";
/// Per-project task partitions.
pub const PROJECT_TASKS: &str = "project-tasks";
/// Single-task detail slots.
pub const TASK: &str = "task";
/// Scope label of the calendar view that shows personal tasks.
pub const PERSONAL_CALENDAR_LABEL: &str = "Personal Tasks";

/// Key of the single-task detail slot.
#[must_use]
pub fn task_key(task_id: i64) -> QueryKey {
    QueryKey::new(TASK).with(task_id)
}

/// Key of a calendar partition.
#[must_use]
pub fn calendar_key(owner_id: i64, scope_label: &str) -> QueryKey {
    QueryKey::new(CALENDAR_TASKS).with(owner_id).with(scope_label)
}

/// Key of a project board partition.
#[must_use]
pub fn project_tasks_key(project_id: i64) -> QueryKey {
    QueryKey::new(PROJECT_TASKS).with(project_id)
}

/// Coordinates task mutations with the query cache and the event bus.
pub struct TaskMutations {
    api: Arc<dyn TaskApi>,
    cache: Arc<QueryCache>,
    bus: EventBus,
}

impl TaskMutations {
    /// Bind the coordinator to its collaborators.
    #[must_use]
    pub fn new(api: Arc<dyn TaskApi>, cache: Arc<QueryCache>, bus: EventBus) -> Self {
        Self { api, cache, bus }
    }

    /// Cache this coordinator invalidates.
    #[must_use]
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Event bus this coordinator publishes on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Create a task. `on_behalf_of_owner` selects the endpoint that honors
    /// `draft.owner_id` instead of the caller.
    ///
    /// # Errors
    ///
    /// Returns the API error unchanged; the cache and bus are not touched.
    pub async fn create_task(&self, draft: TaskDraft, on_behalf_of_owner: bool) -> Result<Task> {
        let span = info_span!("create_task", on_behalf_of_owner);
        async {
            let task = if on_behalf_of_owner {
                self.api.create_with_owner(draft).await?
            } else {
                self.api.create(draft).await?
            };

            let is_personal_task = task.is_personal();
            info!(task_id = task.id, is_personal_task, "task created");

            self.invalidate_task_partitions();
            if is_personal_task {
                self.invalidate_personal_calendars();
            }

            self.bus.publish(AppEvent::TaskCreated(TaskChanged {
                task: task.clone(),
                is_personal_task,
            }));
            Ok(task)
        }
        .instrument(span)
        .await
    }

    /// Update a task and write the confirmed value into its detail slot.
    ///
    /// # Errors
    ///
    /// Returns the API error unchanged; the cache and bus are not touched.
    pub async fn update_task(&self, request: UpdateTaskRequest) -> Result<Task> {
        let span = info_span!("update_task", task_id = request.task_id);
        async {
            let task = self.api.update(request.task_id, request.changes).await?;

            let is_personal_task = task.is_personal();
            info!(task_id = task.id, is_personal_task, "task updated");

            self.cache.set_as(task_key(task.id), &task)?;
            self.invalidate_task_partitions();
            if is_personal_task {
                self.invalidate_personal_calendars();
            }

            self.bus.publish(AppEvent::TaskUpdated(TaskChanged {
                task: task.clone(),
                is_personal_task,
            }));
            Ok(task)
        }
        .instrument(span)
        .await
    }

    /// Delete a task, drop its detail slot and every calendar partition, then
    /// invalidate the remaining task partitions.
    ///
    /// # Errors
    ///
    /// Returns the API error unchanged; the cache and bus are not touched.
    pub async fn delete_task(&self, task_id: i64) -> Result<()> {
        let span = info_span!("delete_task", task_id);
        async {
            self.api.delete(task_id).await?;
            info!(task_id, "task deleted");

            self.cache.remove(&task_key(task_id));

            let calendars = self
                .cache
                .keys_matching(&QueryFilter::prefix(QueryKey::new(CALENDAR_TASKS)));
            for key in &calendars {
                self.cache.remove(key);
            }

            self.invalidate_task_partitions();

            self.bus.publish(AppEvent::TaskDeleted(TaskDeleted { task_id }));
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Invalidate every partition that may contain a task, forcing a refetch
    /// of active and inactive entries alike.
    fn invalidate_task_partitions(&self) {
        for root in [CALENDAR_TASKS, PROJECTS, PERSONAL_TASKS, PROJECT_TASKS] {
            self.cache
                .invalidate_queries(&QueryFilter::prefix(QueryKey::new(root)), RefetchType::All);
        }
    }

    /// Narrower pass for personal tasks: calendar partitions whose scope
    /// label is the personal marker.
    fn invalidate_personal_calendars(&self) {
        let filter = QueryFilter::prefix(QueryKey::new(CALENDAR_TASKS))
            .with_predicate(KeyMatcher::trailing_label(PERSONAL_CALENDAR_LABEL));
        self.cache.invalidate_queries(&filter, RefetchType::All);
    }
}
