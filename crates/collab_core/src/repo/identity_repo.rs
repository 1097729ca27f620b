//! Name-to-identity resolution contract and SQLite adapter.
//!
//! # Invariants
//! - Handles match case-insensitively.
//! - An unknown name resolves to `Ok(None)`, never to an error.

use crate::db::SharedConnection;
use crate::repo::{lock_connection, RepoResult};
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Account a mention can be delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    /// Name written after the mention trigger.
    pub handle: String,
    pub display_name: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        handle: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            handle: handle.into(),
            display_name: display_name.into(),
        }
    }
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn resolve_name(&self, raw_name: &str) -> RepoResult<Option<Identity>>;
}

#[async_trait]
impl<T: IdentityDirectory + ?Sized> IdentityDirectory for Arc<T> {
    async fn resolve_name(&self, raw_name: &str) -> RepoResult<Option<Identity>> {
        (**self).resolve_name(raw_name).await
    }
}

/// SQLite-backed directory over the `users` table.
#[derive(Clone)]
pub struct SqliteIdentityDirectory {
    conn: SharedConnection,
}

impl SqliteIdentityDirectory {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Inserts or updates one user keyed by `user_id`.
    pub fn upsert_identity(&self, identity: &Identity) -> RepoResult<()> {
        let conn = lock_connection(&self.conn);
        conn.execute(
            "INSERT INTO users (id, handle, display_name)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                handle = excluded.handle,
                display_name = excluded.display_name;",
            params![identity.user_id, identity.handle, identity.display_name],
        )?;
        Ok(())
    }
}

#[async_trait]
impl IdentityDirectory for SqliteIdentityDirectory {
    async fn resolve_name(&self, raw_name: &str) -> RepoResult<Option<Identity>> {
        let handle = raw_name.trim();
        if handle.is_empty() {
            return Ok(None);
        }

        let conn = lock_connection(&self.conn);
        let identity = conn
            .query_row(
                "SELECT id, handle, display_name FROM users WHERE handle = ?1;",
                [handle],
                |row| {
                    Ok(Identity {
                        user_id: row.get(0)?,
                        handle: row.get(1)?,
                        display_name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(identity)
    }
}
