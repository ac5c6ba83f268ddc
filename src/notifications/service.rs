//! Notification operations that combine the REST surface with local state.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};

use super::store::NotificationStore;
use crate::api::NotificationApi;
use crate::models::notification::{BulkActionRequest, BulkActionType};
use crate::Result;

/// REST-backed notification operations over a shared [`NotificationStore`].
pub struct NotificationService {
    api: Arc<dyn NotificationApi>,
    store: Arc<NotificationStore>,
}

impl NotificationService {
    /// Bind the service to its collaborators.
    #[must_use]
    pub fn new(api: Arc<dyn NotificationApi>, store: Arc<NotificationStore>) -> Self {
        Self { api, store }
    }

    /// Local state this service updates.
    #[must_use]
    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    /// Reload the list from the server.
    ///
    /// # Errors
    ///
    /// Propagates the API error; local state is left unchanged.
    pub async fn refresh(&self, unread_only: bool) -> Result<()> {
        let notifications = self.api.list(unread_only).await?;
        info!(count = notifications.len(), unread_only, "notifications refreshed");
        self.store.replace_all(notifications);
        Ok(())
    }

    /// Reload the unread counter from the server.
    ///
    /// # Errors
    ///
    /// Propagates the API error; local state is left unchanged.
    pub async fn refresh_unread_count(&self) -> Result<u64> {
        let count = self.api.unread_count().await?;
        self.store.set_unread_count(count);
        Ok(count)
    }

    /// Mark one notification read. The local flag flips immediately and is
    /// reverted if the server rejects the call.
    ///
    /// # Errors
    ///
    /// Propagates the API error after reverting the local change.
    pub async fn mark_as_read(&self, id: i64) -> Result<()> {
        let previous = self.store.snapshot().get(id).cloned();
        let flipped = self.store.mark_read(id);

        if let Err(err) = self.api.mark_as_read(id).await {
            warn!(notification_id = id, %err, "mark as read rejected, reverting");
            if let Some(previous) = previous.filter(|_| flipped) {
                self.store.restore(previous);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Mark every notification read.
    ///
    /// # Errors
    ///
    /// Propagates the API error; local state is left unchanged.
    pub async fn mark_all_as_read(&self) -> Result<()> {
        self.api.mark_all_as_read().await?;
        self.store.mark_all_read();
        Ok(())
    }

    /// Dismiss one notification.
    ///
    /// # Errors
    ///
    /// Propagates the API error; local state is left unchanged.
    pub async fn dismiss(&self, id: i64) -> Result<()> {
        self.api.dismiss(id).await?;
        self.store.dismiss(id);
        Ok(())
    }

    async fn apply_one(&self, action: BulkActionType, id: i64) -> Result<()> {
        match action {
            BulkActionType::MarkAsRead => {
                self.api.mark_as_read(id).await?;
                self.store.mark_read(id);
            }
            BulkActionType::Dismiss => {
                self.api.dismiss(id).await?;
                self.store.dismiss(id);
            }
        }
        Ok(())
    }

    /// Apply `request.action` to each id in order, one call per id.
    ///
    /// Processing stops at the first failure. Items already applied stay
    /// applied, on the server and locally. Returns the number of items
    /// applied.
    ///
    /// # Errors
    ///
    /// The failing call's error, prefixed with the failing id and the number
    /// of items applied before it.
    pub async fn bulk_action(&self, request: &BulkActionRequest) -> Result<usize> {
        let total = request.notification_ids.len();
        for (applied, id) in request.notification_ids.iter().copied().enumerate() {
            if let Err(err) = self.apply_one(request.action, id).await {
                warn!(action = %request.action, notification_id = id, applied, total, %err, "bulk action stopped");
                return Err(err.context(format_args!(
                    "bulk {} stopped at notification {id} after {applied} of {total} applied",
                    request.action
                )));
            }
        }
        info!(action = %request.action, total, "bulk action applied");
        Ok(total)
    }

    /// [`Self::bulk_action`] with the action given by its wire name.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidAction` for an unknown action, before any call is
    /// made; otherwise as [`Self::bulk_action`].
    pub async fn bulk_action_named(&self, action: &str, notification_ids: Vec<i64>) -> Result<usize> {
        let action = BulkActionType::from_str(action)?;
        self.bulk_action(&BulkActionRequest {
            action,
            notification_ids,
        })
        .await
    }

    /// Apply `action` to the current selection, clearing it on success.
    ///
    /// # Errors
    ///
    /// As [`Self::bulk_action`]; the selection is kept on failure.
    pub async fn bulk_action_on_selection(&self, action: BulkActionType) -> Result<usize> {
        let notification_ids: Vec<i64> = self.store.snapshot().selected_ids.iter().copied().collect();
        let applied = self
            .bulk_action(&BulkActionRequest {
                action,
                notification_ids,
            })
            .await?;
        self.store.clear_selection();
        Ok(applied)
    }

    /// Add an active notification to the selection.
    pub fn select(&self, id: i64) -> bool {
        self.store.select(id)
    }

    /// Remove an id from the selection.
    pub fn deselect(&self, id: i64) -> bool {
        self.store.deselect(id)
    }

    /// Flip selection of one id.
    pub fn toggle(&self, id: i64) -> bool {
        self.store.toggle(id)
    }

    /// Select every active notification.
    pub fn select_all_active(&self) -> bool {
        self.store.select_all_active()
    }

    /// Empty the selection.
    pub fn clear_selection(&self) -> bool {
        self.store.clear_selection()
    }
}
