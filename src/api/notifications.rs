//! Notification REST endpoints.

use std::future::Future;
use std::pin::Pin;

use reqwest::Method;

use super::client::ApiClient;
use crate::models::notification::{Notification, UnreadCount};
use crate::Result;

/// Notification endpoints consumed by the notification service.
pub trait NotificationApi: Send + Sync {
    /// `GET /api/notifications`, optionally restricted to unread items.
    ///
    /// # Errors
    ///
    /// Propagates the transport or server error unchanged.
    fn list(
        &self,
        unread_only: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Notification>>> + Send + '_>>;

    /// `GET /api/notifications/unread-count`.
    ///
    /// # Errors
    ///
    /// Propagates the transport or server error unchanged.
    fn unread_count(&self) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>>;

    /// `PUT /api/notifications/{id}/read`.
    ///
    /// # Errors
    ///
    /// Propagates the transport or server error unchanged.
    fn mark_as_read(&self, id: i64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// `PUT /api/notifications/read-all`.
    ///
    /// # Errors
    ///
    /// Propagates the transport or server error unchanged.
    fn mark_all_as_read(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// `PUT /api/notifications/{id}/dismiss`.
    ///
    /// # Errors
    ///
    /// Propagates the transport or server error unchanged.
    fn dismiss(&self, id: i64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

impl NotificationApi for ApiClient {
    fn list(
        &self,
        unread_only: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Notification>>> + Send + '_>> {
        Box::pin(async move {
            let path = if unread_only {
                "/api/notifications?unreadOnly=true"
            } else {
                "/api/notifications"
            };
            self.get_json::<Vec<Notification>>(path).await
        })
    }

    fn unread_count(&self) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let count: UnreadCount = self.get_json("/api/notifications/unread-count").await?;
            Ok(count.0)
        })
    }

    fn mark_as_read(&self, id: i64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.send_empty(Method::PUT, &format!("/api/notifications/{id}/read"))
                .await
        })
    }

    fn mark_all_as_read(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.send_empty(Method::PUT, "/api/notifications/read-all")
                .await
        })
    }

    fn dismiss(&self, id: i64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.send_empty(Method::PUT, &format!("/api/notifications/{id}/dismiss"))
                .await
        })
    }
}
