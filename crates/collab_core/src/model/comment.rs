//! Comment domain model.
//!
//! # Responsibility
//! - Define the immutable `Comment` record and the `CommentDraft` used to
//!   create one.
//! - Validate drafts before any persistence call.
//!
//! # Invariants
//! - A comment always belongs to a parent with a non-empty id.
//! - A comment body has visible text once markup is stripped.
//! - Comments have no mutation path after creation.

use crate::markup::plain_text;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type CommentId = Uuid;

/// Kind of entity a comment thread hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentType {
    Task,
    Responsibility,
}

impl ParentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Responsibility => "responsibility",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "task" => Some(Self::Task),
            "responsibility" => Some(Self::Responsibility),
            _ => None,
        }
    }
}

impl Display for ParentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the entity a thread belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentRef {
    pub parent_type: ParentType,
    /// Empty while the parent entity has not been created yet.
    pub parent_id: String,
}

impl ParentRef {
    pub fn new(parent_type: ParentType, parent_id: impl Into<String>) -> Self {
        Self {
            parent_type,
            parent_id: parent_id.into(),
        }
    }

    pub fn task(parent_id: impl Into<String>) -> Self {
        Self::new(ParentType::Task, parent_id)
    }

    pub fn responsibility(parent_id: impl Into<String>) -> Self {
        Self::new(ParentType::Responsibility, parent_id)
    }

    /// Whether the parent exists far enough to carry comments.
    pub fn is_persisted(&self) -> bool {
        !self.parent_id.trim().is_empty()
    }
}

impl Display for ParentRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.parent_type, self.parent_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentValidationError {
    MissingParent,
    MissingAuthor,
    EmptyBody,
}

impl Display for CommentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingParent => write!(f, "comment parent id is empty"),
            Self::MissingAuthor => write!(f, "comment author is missing"),
            Self::EmptyBody => write!(f, "comment body has no visible text"),
        }
    }
}

impl Error for CommentValidationError {}

/// Returns whether `body` shows any non-whitespace text once markup is removed.
pub fn has_visible_text(body: &str) -> bool {
    !plain_text(body).trim().is_empty()
}

/// Request to create one comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub parent: ParentRef,
    pub author_id: String,
    /// Raw formatted body as produced by the editor.
    pub body: String,
}

impl CommentDraft {
    pub fn new(parent: ParentRef, author_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            parent,
            author_id: author_id.into(),
            body: body.into(),
        }
    }

    pub fn validate(&self) -> Result<(), CommentValidationError> {
        if !self.parent.is_persisted() {
            return Err(CommentValidationError::MissingParent);
        }
        if self.author_id.trim().is_empty() {
            return Err(CommentValidationError::MissingAuthor);
        }
        if self.body.trim().is_empty() || !has_visible_text(&self.body) {
            return Err(CommentValidationError::EmptyBody);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub parent_type: ParentType,
    pub parent_id: String,
    pub author_id: String,
    pub body: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl Comment {
    /// Materializes a draft with a fresh id; callers validate first.
    pub fn from_draft(draft: &CommentDraft, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_type: draft.parent.parent_type,
            parent_id: draft.parent.parent_id.clone(),
            author_id: draft.author_id.clone(),
            body: draft.body.clone(),
            created_at,
        }
    }

    pub fn parent(&self) -> ParentRef {
        ParentRef::new(self.parent_type, self.parent_id.clone())
    }
}
