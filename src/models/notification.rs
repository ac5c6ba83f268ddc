//! Server-side notification model.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

/// Delivery channel a notification was sent through.
///
/// Unknown names are preserved in [`Channel::Other`] so newer servers do not
/// break decoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Channel {
    /// Shown inside the application.
    InApp,
    /// Sent by email.
    Email,
    /// Delivered over the push channel.
    Push,
    /// Any channel this client does not know about.
    Other(String),
}

impl From<String> for Channel {
    fn from(value: String) -> Self {
        match value.as_str() {
            "IN_APP" => Self::InApp,
            "EMAIL" => Self::Email,
            "PUSH" => Self::Push,
            _ => Self::Other(value),
        }
    }
}

impl From<Channel> for String {
    fn from(value: Channel) -> Self {
        match value {
            Channel::InApp => "IN_APP".into(),
            Channel::Email => "EMAIL".into(),
            Channel::Push => "PUSH".into(),
            Channel::Other(name) => name,
        }
    }
}

/// Notification urgency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    /// Informational.
    Low,
    /// Default urgency.
    Medium,
    /// Needs attention soon.
    High,
    /// Any priority this client does not know about.
    Other(String),
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        match value.as_str() {
            "LOW" => Self::Low,
            "MEDIUM" => Self::Medium,
            "HIGH" => Self::High,
            _ => Self::Other(value),
        }
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        match value {
            Priority::Low => "LOW".into(),
            Priority::Medium => "MEDIUM".into(),
            Priority::High => "HIGH".into(),
            Priority::Other(name) => name,
        }
    }
}

/// A notification addressed to the current user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Server-assigned identifier.
    pub notification_id: i64,
    /// User that triggered the notification, if any.
    #[serde(default)]
    pub author_id: Option<i64>,
    /// Recipient user.
    pub target_id: i64,
    /// Server-defined category (e.g. `TASK_ASSIGNED`).
    pub notification_type: String,
    /// Short subject line.
    pub subject: String,
    /// Body text.
    pub message: String,
    /// Channels the notification was delivered through.
    #[serde(default)]
    pub channels: Vec<Channel>,
    /// Read flag.
    #[serde(default)]
    pub read_status: bool,
    /// Dismissed flag; dismissed notifications leave the active view.
    #[serde(default)]
    pub dismissed_status: bool,
    /// Urgency.
    pub priority: Priority,
    /// Deep link into the application.
    #[serde(default)]
    pub link: Option<String>,
    /// Creation timestamp, as sent by the server.
    pub created_at: String,
    /// Read timestamp, as sent by the server.
    #[serde(default)]
    pub read_at: Option<String>,
}

/// Bulk operation applied to a set of notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BulkActionType {
    /// Mark every listed notification as read.
    MarkAsRead,
    /// Dismiss every listed notification.
    Dismiss,
}

impl FromStr for BulkActionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markAsRead" => Ok(Self::MarkAsRead),
            "dismiss" => Ok(Self::Dismiss),
            other => Err(AppError::InvalidAction(format!(
                "unknown bulk action type `{other}`; expected `markAsRead` or `dismiss`"
            ))),
        }
    }
}

impl Display for BulkActionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarkAsRead => f.write_str("markAsRead"),
            Self::Dismiss => f.write_str("dismiss"),
        }
    }
}

/// Request body of a bulk action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkActionRequest {
    /// Operation to apply.
    #[serde(rename = "type")]
    pub action: BulkActionType,
    /// Target notifications, processed in order.
    pub notification_ids: Vec<i64>,
}

/// Unread counter as carried by the REST endpoint and push messages: either
/// a bare number or an object with a `count` / `unreadCount` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CountRepr", into = "u64")]
pub struct UnreadCount(pub u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum CountRepr {
    Bare(u64),
    Wrapped {
        #[serde(alias = "unreadCount")]
        count: u64,
    },
}

impl From<CountRepr> for UnreadCount {
    fn from(value: CountRepr) -> Self {
        match value {
            CountRepr::Bare(n) | CountRepr::Wrapped { count: n } => Self(n),
        }
    }
}

impl From<UnreadCount> for u64 {
    fn from(value: UnreadCount) -> Self {
        value.0
    }
}

/// Reference to a notification by id: a bare number or an object with a
/// `notificationId` / `id` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RefRepr", into = "i64")]
pub struct NotificationRef(pub i64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RefRepr {
    Bare(i64),
    Wrapped {
        #[serde(rename = "notificationId", alias = "id")]
        notification_id: i64,
    },
}

impl From<RefRepr> for NotificationRef {
    fn from(value: RefRepr) -> Self {
        match value {
            RefRepr::Bare(id) | RefRepr::Wrapped { notification_id: id } => Self(id),
        }
    }
}

impl From<NotificationRef> for i64 {
    fn from(value: NotificationRef) -> Self {
        value.0
    }
}
