//! Domain model module declarations.

pub mod notice;
pub mod notification;
pub mod task;
