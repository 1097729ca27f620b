//! Collaboration core: rich-text editing, mentions and notifications.
//! This crate is the single source of truth for the collaboration invariants.

pub mod config;
pub mod db;
pub mod editor;
pub mod logging;
pub mod markup;
pub mod mention;
pub mod model;
pub mod policy;
pub mod repo;
pub mod service;

pub use config::{CollabConfig, ConfigError, LoggingConfig};
pub use editor::document::{Block, BlockKind, Document, InlineFlag, InlineStyle, TextRun};
pub use editor::ops::{FormatError, Selection};
pub use editor::surface::{
    ChangeHandlerId, ClipboardContent, EditorBuffer, FormatCommand, FormatOutcome,
    FormattingPrimitives, KeyChord, RichTextSurface, TextRunPrimitives,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use mention::parser::{
    extract_display_markup, extract_mention_targets, scan_mentions, MentionParser,
    MentionParserError, MentionToken,
};
pub use model::comment::{
    Comment, CommentDraft, CommentId, CommentValidationError, ParentRef, ParentType,
};
pub use model::notification::{
    AssignmentPayload, MentionPayload, NewNotification, Notification, NotificationId,
    NotificationKind, TaskAssignment,
};
pub use policy::AccessPolicy;
pub use repo::comment_repo::{CommentRepository, SqliteCommentRepository};
pub use repo::identity_repo::{Identity, IdentityDirectory, SqliteIdentityDirectory};
pub use repo::notification_repo::{NotificationRepository, SqliteNotificationRepository};
pub use repo::{RepoError, RepoResult};
pub use service::comment_thread::{CommentThread, PostOutcome, ThreadError, ThreadState};
pub use service::mention_dispatch::{
    DispatchError, DispatchHandle, DispatchReport, MentionDispatcher,
};
pub use service::notification_center::{CenterError, NotificationCenter, PollOutcome};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
