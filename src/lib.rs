#![forbid(unsafe_code)]

//! Client-side synchronization layer for a task-management service.
//!
//! Three cooperating pieces keep views consistent with the server:
//!
//! - [`notice`]: a bounded, timer-driven queue of transient user notices.
//! - [`coordinator`]: task mutations that invalidate [`cache`] partitions
//!   and publish [`events`] only after the server confirms.
//! - [`realtime`]: a reconnecting push client feeding [`notifications`].

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod events;
pub mod models;
pub mod notice;
pub mod notifications;
pub mod realtime;
pub mod timer;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
