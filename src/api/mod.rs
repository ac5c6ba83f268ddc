//! REST collaborators: the task mutation endpoints and the notification
//! endpoints, both behind traits so tests can substitute fakes.

pub mod client;
pub mod notifications;
pub mod tasks;

pub use client::{ApiClient, CurrentUser};
pub use notifications::NotificationApi;
pub use tasks::TaskApi;
