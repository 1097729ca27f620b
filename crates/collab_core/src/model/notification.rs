//! Notification domain model.
//!
//! # Responsibility
//! - Define the `Notification` record, its kinds and structured payloads.
//! - Provide display ordering and derived unread counts.
//!
//! # Invariants
//! - `read` only ever transitions `false -> true` through `mark_read`.
//! - Payloads carry enough data for `describe()` without refetching the
//!   source comment or task.
//! - Display order is newest first, ties broken by ascending id.

use crate::model::comment::{CommentId, ParentType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type NotificationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Mention,
    Assignment,
    Other,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mention => "mention",
            Self::Assignment => "assignment",
            Self::Other => "other",
        }
    }

    /// Unknown stored kinds map to `Other`.
    pub fn from_db(value: &str) -> Self {
        match value {
            "mention" => Self::Mention,
            "assignment" => Self::Assignment,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: String,
    pub kind: NotificationKind,
    /// Opaque to the core except through `describe()`.
    pub payload: Value,
    pub read: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl Notification {
    pub fn mark_read(&mut self) {
        self.read = true;
    }

    /// Typed view of the payload, `None` when it does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }

    /// One-line human-readable summary.
    pub fn describe(&self) -> String {
        match self.kind {
            NotificationKind::Mention => match self.payload_as::<MentionPayload>() {
                Some(payload) => format!(
                    "{} mentioned you on {} {}: \"{}\"",
                    payload.author_id, payload.parent_type, payload.parent_id, payload.excerpt
                ),
                None => "You were mentioned in a comment".to_string(),
            },
            NotificationKind::Assignment => match self.payload_as::<AssignmentPayload>() {
                Some(payload) => format!(
                    "{} assigned you \"{}\"",
                    payload.assigned_by, payload.task_title
                ),
                None => "You were assigned a task".to_string(),
            },
            NotificationKind::Other => self
                .payload
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| "New notification".to_string(), str::to_string),
        }
    }
}

/// Request to create one notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionPayload {
    pub author_id: String,
    pub parent_type: ParentType,
    pub parent_id: String,
    pub comment_id: Option<CommentId>,
    /// Plain-text start of the comment.
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPayload {
    pub assigned_by: String,
    pub task_id: String,
    pub task_title: String,
}

/// Event emitted when a task gets an assignee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAssignment {
    pub task_id: String,
    pub task_title: String,
    pub assignee_id: String,
    pub assigned_by: String,
}

/// Sorts newest first; equal timestamps fall back to ascending id.
pub fn sort_for_display(items: &mut [Notification]) {
    items.sort_by(|left, right| {
        right
            .created_at
            .cmp(&left.created_at)
            .then_with(|| left.id.cmp(&right.id))
    });
}

pub fn unread_count(items: &[Notification]) -> usize {
    items.iter().filter(|item| !item.read).count()
}

/// Collapses whitespace and truncates to `max_chars`, appending `...` when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    cut.truncate(cut.trim_end().len());
    cut.push_str("...");
    cut
}
