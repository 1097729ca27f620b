#![allow(dead_code)]

use async_trait::async_trait;
use collab_core::{
    Comment, CommentDraft, CommentRepository, Identity, IdentityDirectory, NewNotification,
    Notification, NotificationId, NotificationKind, NotificationRepository, ParentRef, RepoError,
    RepoResult,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// In-memory persistence service with switchable failures and latency.
#[derive(Default)]
pub struct FakeStore {
    comments: Mutex<Vec<Comment>>,
    notifications: Mutex<Vec<Notification>>,
    identities: Mutex<Vec<Identity>>,
    clock: AtomicI64,

    pub comment_fetches: AtomicUsize,
    pub comment_creates: AtomicUsize,
    pub notification_fetches: AtomicUsize,
    pub fetches_in_flight: AtomicUsize,
    pub max_fetches_in_flight: AtomicUsize,
    pub mark_read_calls: AtomicUsize,

    pub create_delay_ms: AtomicU64,
    pub fetch_delay_ms: AtomicU64,
    pub comment_fetch_delay_ms: AtomicU64,

    pub fail_fetch_comments: AtomicBool,
    pub fail_create_comment: AtomicBool,
    pub fail_create_notification: AtomicBool,
    pub fail_fetch_notifications: AtomicBool,
    pub fail_mark_read: AtomicBool,
    pub fail_resolve: AtomicBool,
}

impl FakeStore {
    pub fn with_identities(identities: &[(&str, &str)]) -> Self {
        let store = Self::default();
        for (user_id, handle) in identities {
            store.add_identity(user_id, handle);
        }
        store
    }

    pub fn add_identity(&self, user_id: &str, handle: &str) {
        self.identities
            .lock()
            .unwrap()
            .push(Identity::new(user_id, handle, handle));
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.fetch_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_comment_fetch_delay(&self, delay: Duration) {
        self.comment_fetch_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.create_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    pub fn seed_comment(&self, parent: &ParentRef, author_id: &str, body: &str) -> Comment {
        let draft = CommentDraft::new(parent.clone(), author_id, body);
        let comment = Comment::from_draft(&draft, self.tick());
        self.comments.lock().unwrap().push(comment.clone());
        comment
    }

    pub fn seed_notification(&self, recipient_id: &str, created_at: i64) -> NotificationId {
        self.seed_notification_with_id(Uuid::new_v4(), recipient_id, created_at)
    }

    pub fn seed_notification_with_id(
        &self,
        id: NotificationId,
        recipient_id: &str,
        created_at: i64,
    ) -> NotificationId {
        self.notifications.lock().unwrap().push(Notification {
            id,
            recipient_id: recipient_id.to_string(),
            kind: NotificationKind::Other,
            payload: json!({ "message": format!("note {created_at}") }),
            read: false,
            created_at,
        });
        id
    }

    pub fn stored_notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn notifications_for(&self, recipient_id: &str) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.recipient_id == recipient_id)
            .cloned()
            .collect()
    }

    pub fn stored_comments(&self) -> Vec<Comment> {
        self.comments.lock().unwrap().clone()
    }

    fn tick(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn delay(millis: &AtomicU64) {
        let millis = millis.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn offline(flag: &AtomicBool) -> RepoResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("service offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CommentRepository for FakeStore {
    async fn fetch_comments(&self, parent: &ParentRef) -> RepoResult<Vec<Comment>> {
        self.comment_fetches.fetch_add(1, Ordering::SeqCst);
        Self::offline(&self.fail_fetch_comments)?;
        // The snapshot is taken when the request starts, like a server read.
        let snapshot: Vec<Comment> = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|comment| &comment.parent() == parent)
            .cloned()
            .collect();
        Self::delay(&self.comment_fetch_delay_ms).await;
        Ok(snapshot)
    }

    async fn create_comment(&self, draft: &CommentDraft) -> RepoResult<Comment> {
        self.comment_creates.fetch_add(1, Ordering::SeqCst);
        Self::delay(&self.create_delay_ms).await;
        Self::offline(&self.fail_create_comment)?;
        draft.validate()?;
        let comment = Comment::from_draft(draft, self.tick());
        self.comments.lock().unwrap().push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl NotificationRepository for FakeStore {
    async fn fetch_notifications(&self, recipient_id: &str) -> RepoResult<Vec<Notification>> {
        self.notification_fetches.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.fetches_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_fetches_in_flight
            .fetch_max(now_in_flight, Ordering::SeqCst);

        // Server state is read when the request arrives.
        let snapshot = self.notifications_for(recipient_id);
        Self::delay(&self.fetch_delay_ms).await;
        self.fetches_in_flight.fetch_sub(1, Ordering::SeqCst);

        Self::offline(&self.fail_fetch_notifications)?;
        Ok(snapshot)
    }

    async fn create_notification(&self, request: &NewNotification) -> RepoResult<Notification> {
        Self::offline(&self.fail_create_notification)?;
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id: request.recipient_id.clone(),
            kind: request.kind,
            payload: request.payload.clone(),
            read: false,
            created_at: self.tick(),
        };
        self.notifications
            .lock()
            .unwrap()
            .push(notification.clone());
        Ok(notification)
    }

    async fn mark_notification_as_read(&self, id: NotificationId) -> RepoResult<bool> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        Self::offline(&self.fail_mark_read)?;
        let mut notifications = self.notifications.lock().unwrap();
        match notifications.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl IdentityDirectory for FakeStore {
    async fn resolve_name(&self, raw_name: &str) -> RepoResult<Option<Identity>> {
        Self::offline(&self.fail_resolve)?;
        Ok(self
            .identities
            .lock()
            .unwrap()
            .iter()
            .find(|identity| identity.handle.eq_ignore_ascii_case(raw_name))
            .cloned())
    }
}
