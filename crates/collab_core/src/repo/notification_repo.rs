//! Notification persistence contract and SQLite adapter.
//!
//! # Responsibility
//! - Fetch a recipient's notifications in display order.
//! - Create notifications and record read state.
//!
//! # Invariants
//! - `mark_notification_as_read` never clears a read flag; the schema
//!   trigger rejects such updates as well.
//! - Rows with unparsable payloads surface as `RepoError::InvalidData`.

use crate::db::SharedConnection;
use crate::model::notification::{NewNotification, Notification, NotificationId, NotificationKind};
use crate::model::now_epoch_ms;
use crate::repo::{lock_connection, parse_uuid, RepoError, RepoResult};
use async_trait::async_trait;
use rusqlite::{params, Row};
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Notifications for `recipient_id`, newest first.
    async fn fetch_notifications(&self, recipient_id: &str) -> RepoResult<Vec<Notification>>;
    async fn create_notification(&self, request: &NewNotification) -> RepoResult<Notification>;
    /// Returns `false` when no notification has this id.
    async fn mark_notification_as_read(&self, id: NotificationId) -> RepoResult<bool>;
}

#[async_trait]
impl<T: NotificationRepository + ?Sized> NotificationRepository for Arc<T> {
    async fn fetch_notifications(&self, recipient_id: &str) -> RepoResult<Vec<Notification>> {
        (**self).fetch_notifications(recipient_id).await
    }

    async fn create_notification(&self, request: &NewNotification) -> RepoResult<Notification> {
        (**self).create_notification(request).await
    }

    async fn mark_notification_as_read(&self, id: NotificationId) -> RepoResult<bool> {
        (**self).mark_notification_as_read(id).await
    }
}

/// SQLite-backed notification repository.
#[derive(Clone)]
pub struct SqliteNotificationRepository {
    conn: SharedConnection,
}

impl SqliteNotificationRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl NotificationRepository for SqliteNotificationRepository {
    async fn fetch_notifications(&self, recipient_id: &str) -> RepoResult<Vec<Notification>> {
        let conn = lock_connection(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, recipient_id, kind, payload, is_read, created_at
             FROM notifications
             WHERE recipient_id = ?1
             ORDER BY created_at DESC, id ASC;",
        )?;
        let mut rows = stmt.query([recipient_id])?;

        let mut notifications = Vec::new();
        while let Some(row) = rows.next()? {
            notifications.push(parse_notification_row(row)?);
        }
        Ok(notifications)
    }

    async fn create_notification(&self, request: &NewNotification) -> RepoResult<Notification> {
        if request.recipient_id.trim().is_empty() {
            return Err(RepoError::InvalidData(
                "notification recipient cannot be empty".to_string(),
            ));
        }
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id: request.recipient_id.clone(),
            kind: request.kind,
            payload: request.payload.clone(),
            read: false,
            created_at: now_epoch_ms(),
        };
        let payload = serde_json::to_string(&notification.payload)
            .map_err(|err| RepoError::InvalidData(format!("unserializable payload: {err}")))?;

        let conn = lock_connection(&self.conn);
        conn.execute(
            "INSERT INTO notifications (id, recipient_id, kind, payload, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5);",
            params![
                notification.id.to_string(),
                notification.recipient_id,
                notification.kind.as_str(),
                payload,
                notification.created_at,
            ],
        )?;
        Ok(notification)
    }

    async fn mark_notification_as_read(&self, id: NotificationId) -> RepoResult<bool> {
        let conn = lock_connection(&self.conn);
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1;",
            [id.to_string()],
        )?;
        Ok(changed > 0)
    }
}

fn parse_notification_row(row: &Row<'_>) -> RepoResult<Notification> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "notifications.id")?;

    let payload_text: String = row.get("payload")?;
    let payload = serde_json::from_str(&payload_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid json payload in notifications.payload for `{id_text}`"
        ))
    })?;

    let read = match row.get::<_, i64>("is_read")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_read value `{other}` in notifications.is_read"
            )));
        }
    };

    let kind_text: String = row.get("kind")?;
    Ok(Notification {
        id,
        recipient_id: row.get("recipient_id")?,
        kind: NotificationKind::from_db(&kind_text),
        payload,
        read,
        created_at: row.get("created_at")?,
    })
}
