//! Ephemeral UI notice (toast) model.

use serde::{Deserialize, Serialize};

/// Visual treatment of a notice.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeVariant {
    /// Neutral styling.
    #[default]
    Default,
    /// Error or destructive-action styling.
    Destructive,
}

/// A notice held in the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    /// Queue-assigned identifier, unique for the lifetime of the process.
    pub id: String,
    /// Heading line.
    pub title: Option<String>,
    /// Body text.
    pub description: Option<String>,
    /// Visual treatment.
    pub variant: NoticeVariant,
    /// `false` once dismissed; the notice lingers until its removal fires.
    pub open: bool,
}

/// Content of a notice to enqueue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoticeInput {
    /// Heading line.
    pub title: Option<String>,
    /// Body text.
    pub description: Option<String>,
    /// Visual treatment.
    pub variant: NoticeVariant,
}

impl NoticeInput {
    /// Notice with a title only.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Use the destructive variant.
    #[must_use]
    pub fn destructive(mut self) -> Self {
        self.variant = NoticeVariant::Destructive;
        self
    }
}

/// Partial update applied to an existing notice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoticePatch {
    /// Replacement heading.
    pub title: Option<String>,
    /// Replacement body.
    pub description: Option<String>,
    /// Replacement variant.
    pub variant: Option<NoticeVariant>,
}

impl Notice {
    /// Merge a patch into this notice; `None` fields are left untouched.
    pub fn apply(&mut self, patch: NoticePatch) {
        if let Some(title) = patch.title {
            self.title = Some(title);
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(variant) = patch.variant {
            self.variant = variant;
        }
    }
}
