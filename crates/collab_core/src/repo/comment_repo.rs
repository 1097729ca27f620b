//! Comment persistence contract and SQLite adapter.
//!
//! # Responsibility
//! - Fetch a parent's comments in creation order.
//! - Create comments from validated drafts.
//!
//! # Invariants
//! - `create_comment` calls `CommentDraft::validate()` before inserting.
//! - Comments of the same millisecond keep insertion order.

use crate::db::SharedConnection;
use crate::model::comment::{Comment, CommentDraft, ParentRef, ParentType};
use crate::model::now_epoch_ms;
use crate::repo::{lock_connection, parse_uuid, RepoError, RepoResult};
use async_trait::async_trait;
use rusqlite::{params, Row};
use std::sync::Arc;

const COMMENT_SELECT_SQL: &str = "SELECT
    id,
    parent_type,
    parent_id,
    author_id,
    body,
    created_at
FROM comments";

#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Comments of `parent`, oldest first.
    async fn fetch_comments(&self, parent: &ParentRef) -> RepoResult<Vec<Comment>>;
    async fn create_comment(&self, draft: &CommentDraft) -> RepoResult<Comment>;
}

#[async_trait]
impl<T: CommentRepository + ?Sized> CommentRepository for Arc<T> {
    async fn fetch_comments(&self, parent: &ParentRef) -> RepoResult<Vec<Comment>> {
        (**self).fetch_comments(parent).await
    }

    async fn create_comment(&self, draft: &CommentDraft) -> RepoResult<Comment> {
        (**self).create_comment(draft).await
    }
}

/// SQLite-backed comment repository.
#[derive(Clone)]
pub struct SqliteCommentRepository {
    conn: SharedConnection,
}

impl SqliteCommentRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CommentRepository for SqliteCommentRepository {
    async fn fetch_comments(&self, parent: &ParentRef) -> RepoResult<Vec<Comment>> {
        if !parent.is_persisted() {
            return Ok(Vec::new());
        }

        let conn = lock_connection(&self.conn);
        let mut stmt = conn.prepare(&format!(
            "{COMMENT_SELECT_SQL}
             WHERE parent_type = ?1 AND parent_id = ?2
             ORDER BY created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query(params![parent.parent_type.as_str(), parent.parent_id])?;

        let mut comments = Vec::new();
        while let Some(row) = rows.next()? {
            comments.push(parse_comment_row(row)?);
        }
        Ok(comments)
    }

    async fn create_comment(&self, draft: &CommentDraft) -> RepoResult<Comment> {
        draft.validate()?;
        let comment = Comment::from_draft(draft, now_epoch_ms());

        let conn = lock_connection(&self.conn);
        conn.execute(
            "INSERT INTO comments (
                id,
                parent_type,
                parent_id,
                author_id,
                body,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                comment.id.to_string(),
                comment.parent_type.as_str(),
                comment.parent_id,
                comment.author_id,
                comment.body,
                comment.created_at,
            ],
        )?;
        Ok(comment)
    }
}

fn parse_comment_row(row: &Row<'_>) -> RepoResult<Comment> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "comments.id")?;

    let type_text: String = row.get("parent_type")?;
    let parent_type = ParentType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid parent type `{type_text}` in comments.parent_type"
        ))
    })?;

    Ok(Comment {
        id,
        parent_type,
        parent_id: row.get("parent_id")?,
        author_id: row.get("author_id")?,
        body: row.get("body")?,
        created_at: row.get("created_at")?,
    })
}
