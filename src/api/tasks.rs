//! Task REST endpoints.

use std::future::Future;
use std::pin::Pin;

use reqwest::Method;

use super::client::ApiClient;
use crate::models::task::{Task, TaskDraft};
use crate::Result;

/// Task mutation endpoints consumed by the invalidation coordinator.
pub trait TaskApi: Send + Sync {
    /// `POST /api/tasks`.
    ///
    /// # Errors
    ///
    /// Propagates the transport or server error unchanged.
    fn create(&self, draft: TaskDraft) -> Pin<Box<dyn Future<Output = Result<Task>> + Send + '_>>;

    /// `POST /api/tasks/with-owner`, used when acting on behalf of another owner.
    ///
    /// # Errors
    ///
    /// Propagates the transport or server error unchanged.
    fn create_with_owner(
        &self,
        draft: TaskDraft,
    ) -> Pin<Box<dyn Future<Output = Result<Task>> + Send + '_>>;

    /// `PUT /api/tasks/{id}`.
    ///
    /// # Errors
    ///
    /// Propagates the transport or server error unchanged.
    fn update(
        &self,
        task_id: i64,
        changes: TaskDraft,
    ) -> Pin<Box<dyn Future<Output = Result<Task>> + Send + '_>>;

    /// `DELETE /api/tasks/{id}`.
    ///
    /// # Errors
    ///
    /// Propagates the transport or server error unchanged.
    fn delete(&self, task_id: i64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

impl TaskApi for ApiClient {
    fn create(&self, draft: TaskDraft) -> Pin<Box<dyn Future<Output = Result<Task>> + Send + '_>> {
        Box::pin(async move { self.send_json::<_, Task>(Method::POST, "/api/tasks", &draft).await })
    }

    fn create_with_owner(
        &self,
        draft: TaskDraft,
    ) -> Pin<Box<dyn Future<Output = Result<Task>> + Send + '_>> {
        Box::pin(async move {
            self.send_json::<_, Task>(Method::POST, "/api/tasks/with-owner", &draft)
                .await
        })
    }

    fn update(
        &self,
        task_id: i64,
        changes: TaskDraft,
    ) -> Pin<Box<dyn Future<Output = Result<Task>> + Send + '_>> {
        Box::pin(async move {
            self.send_json::<_, Task>(Method::PUT, &format!("/api/tasks/{task_id}"), &changes)
                .await
        })
    }

    fn delete(&self, task_id: i64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.send_empty(Method::DELETE, &format!("/api/tasks/{task_id}"))
                .await
        })
    }
}
