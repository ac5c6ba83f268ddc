//! Messages delivered on the per-user notification topic.

use serde::{Deserialize, Serialize};

use crate::models::notification::{Notification, NotificationRef, UnreadCount};
use crate::Result;

/// Envelope of a push message: `{ "type": ..., "data": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum PushMessage {
    /// A new or changed notification.
    Notification(Notification),
    /// Authoritative unread counter.
    UnreadCountUpdate(UnreadCount),
    /// A notification was read on another client.
    MarkAsRead(NotificationRef),
    /// A notification was dismissed on another client.
    Dismiss(NotificationRef),
}

impl PushMessage {
    /// Parse a frame body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Decode` for malformed JSON or an unknown `type`.
    pub fn parse(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Wire name of the `type` discriminator.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Notification(_) => "notification",
            Self::UnreadCountUpdate(_) => "unreadCountUpdate",
            Self::MarkAsRead(_) => "markAsRead",
            Self::Dismiss(_) => "dismiss",
        }
    }
}
