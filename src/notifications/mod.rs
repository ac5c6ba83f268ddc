//! Notification list, unread counter, and selection.

pub mod service;
pub mod store;

pub use service::NotificationService;
pub use store::{NotificationState, NotificationStore};
