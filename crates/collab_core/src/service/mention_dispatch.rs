//! Mention and assignment notification dispatch.
//!
//! # Responsibility
//! - Turn the mention targets of a comment body into one notification per
//!   distinct resolved identity.
//! - Run that work as a cancellable background task with an awaitable handle.
//!
//! # Invariants
//! - Unresolved names are dropped silently; they never produce errors.
//! - The author never notifies themselves, even when self-mentioned.
//! - Two names resolving to the same account produce one notification.
//! - Dispatch failures are logged and reported, never propagated as errors.

use crate::config::{CollabConfig, DEFAULT_EXCERPT_CHARS};
use crate::markup::plain_text;
use crate::mention::parser::{MentionParser, MentionParserError};
use crate::model::comment::{CommentId, ParentRef};
use crate::model::notification::{
    excerpt, AssignmentPayload, MentionPayload, NewNotification, Notification, NotificationKind,
    TaskAssignment,
};
use crate::repo::identity_repo::IdentityDirectory;
use crate::repo::notification_repo::NotificationRepository;
use crate::repo::{RepoError, RepoResult};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Summary of one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Recipient user ids that received a notification.
    pub created: Vec<String>,
    /// Mentioned names with no matching identity.
    pub unresolved: Vec<String>,
    /// Names that resolved to the author.
    pub self_mentions: usize,
    /// Names or recipients whose lookup or creation failed.
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// `spawn` was called outside a tokio runtime; nothing ran.
    NoRuntime,
    Cancelled,
    Panicked,
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRuntime => write!(f, "no async runtime available for dispatch"),
            Self::Cancelled => write!(f, "dispatch was cancelled"),
            Self::Panicked => write!(f, "dispatch task panicked"),
        }
    }
}

impl Error for DispatchError {}

/// Handle to a background dispatch task.
///
/// Dropping the handle detaches the task; it keeps running.
#[derive(Debug)]
pub struct DispatchHandle {
    task: Option<JoinHandle<DispatchReport>>,
}

impl DispatchHandle {
    fn detached() -> Self {
        Self { task: None }
    }

    /// Waits for the task to finish.
    pub async fn wait(self) -> Result<DispatchReport, DispatchError> {
        let Some(task) = self.task else {
            return Err(DispatchError::NoRuntime);
        };
        task.await.map_err(|err| {
            if err.is_cancelled() {
                DispatchError::Cancelled
            } else {
                DispatchError::Panicked
            }
        })
    }

    /// Aborts the task; notifications already created stay created.
    pub fn cancel(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

/// Creates notifications for mentions and task assignments.
#[derive(Clone)]
pub struct MentionDispatcher {
    notifications: Arc<dyn NotificationRepository>,
    identities: Arc<dyn IdentityDirectory>,
    parser: MentionParser,
    excerpt_chars: usize,
}

impl MentionDispatcher {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        identities: Arc<dyn IdentityDirectory>,
    ) -> Self {
        Self {
            notifications,
            identities,
            parser: MentionParser::default(),
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }

    /// Uses the configured trigger and excerpt length.
    pub fn from_config(
        notifications: Arc<dyn NotificationRepository>,
        identities: Arc<dyn IdentityDirectory>,
        config: &CollabConfig,
    ) -> Result<Self, MentionParserError> {
        let mut dispatcher = Self::new(notifications, identities);
        dispatcher.parser = MentionParser::new(config.mention_trigger)?;
        dispatcher.excerpt_chars = config.excerpt_chars.max(1);
        Ok(dispatcher)
    }

    pub fn parser(&self) -> &MentionParser {
        &self.parser
    }

    /// Resolves every mention in `body` and notifies each distinct identity
    /// other than the author.
    pub async fn create_mention_notifications(
        &self,
        body: &str,
        author_id: &str,
        parent: &ParentRef,
        comment_id: Option<CommentId>,
    ) -> DispatchReport {
        let started_at = Instant::now();
        let targets = self.parser.extract_mention_targets(body);
        let mut report = DispatchReport::default();
        if targets.is_empty() {
            debug!("event=mention_dispatch module=service status=skipped reason=no_mentions");
            return report;
        }

        let payload = MentionPayload {
            author_id: author_id.to_string(),
            parent_type: parent.parent_type,
            parent_id: parent.parent_id.clone(),
            comment_id,
            excerpt: excerpt(&plain_text(body), self.excerpt_chars),
        };
        let payload = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    "event=mention_dispatch module=service status=error error_code=payload_encode_failed error={}",
                    err
                );
                report.failed.extend(targets);
                return report;
            }
        };

        let mut notified: HashSet<String> = HashSet::new();
        for name in targets {
            let identity = match self.identities.resolve_name(&name).await {
                Ok(Some(identity)) => identity,
                Ok(None) => {
                    report.unresolved.push(name);
                    continue;
                }
                Err(err) => {
                    warn!(
                        "event=mention_dispatch module=service status=error error_code=resolve_failed error={}",
                        err
                    );
                    report.failed.push(name);
                    continue;
                }
            };

            if same_principal(&identity.user_id, author_id) {
                report.self_mentions += 1;
                continue;
            }
            if !notified.insert(identity.user_id.clone()) {
                continue;
            }

            let request = NewNotification {
                recipient_id: identity.user_id.clone(),
                kind: NotificationKind::Mention,
                payload: payload.clone(),
            };
            match self.notifications.create_notification(&request).await {
                Ok(_) => report.created.push(identity.user_id),
                Err(err) => {
                    warn!(
                        "event=mention_dispatch module=service status=error error_code=create_failed error={}",
                        err
                    );
                    report.failed.push(identity.user_id);
                }
            }
        }

        info!(
            "event=mention_dispatch module=service status=ok parent={} created={} unresolved={} self_mentions={} failed={} duration_ms={}",
            parent,
            report.created.len(),
            report.unresolved.len(),
            report.self_mentions,
            report.failed.len(),
            started_at.elapsed().as_millis()
        );
        report
    }

    /// Runs `create_mention_notifications` as a background task.
    ///
    /// Outside a tokio runtime nothing runs and `wait()` reports
    /// `DispatchError::NoRuntime`.
    pub fn spawn(
        &self,
        body: String,
        author_id: String,
        parent: ParentRef,
        comment_id: Option<CommentId>,
    ) -> DispatchHandle {
        let Ok(runtime) = Handle::try_current() else {
            warn!("event=mention_dispatch module=service status=skipped reason=no_runtime");
            return DispatchHandle::detached();
        };
        let dispatcher = self.clone();
        let task = runtime.spawn(async move {
            dispatcher
                .create_mention_notifications(&body, &author_id, &parent, comment_id)
                .await
        });
        DispatchHandle { task: Some(task) }
    }

    /// Notifies the assignee unless they assigned the task to themselves.
    ///
    /// Returns `Ok(None)` for self-assignment.
    pub async fn notify_assignment(
        &self,
        assignment: &TaskAssignment,
    ) -> RepoResult<Option<Notification>> {
        if assignment.assignee_id.trim().is_empty() {
            return Err(RepoError::InvalidData(
                "assignment has no assignee".to_string(),
            ));
        }
        if same_principal(&assignment.assignee_id, &assignment.assigned_by) {
            debug!("event=assignment_notify module=service status=skipped reason=self_assignment");
            return Ok(None);
        }

        let payload = AssignmentPayload {
            assigned_by: assignment.assigned_by.clone(),
            task_id: assignment.task_id.clone(),
            task_title: assignment.task_title.clone(),
        };
        let payload = serde_json::to_value(&payload)
            .map_err(|err| RepoError::InvalidData(format!("unserializable payload: {err}")))?;
        let request = NewNotification {
            recipient_id: assignment.assignee_id.clone(),
            kind: NotificationKind::Assignment,
            payload,
        };

        match self.notifications.create_notification(&request).await {
            Ok(notification) => {
                info!(
                    "event=assignment_notify module=service status=ok notification_id={}",
                    notification.id
                );
                Ok(Some(notification))
            }
            Err(err) => {
                warn!(
                    "event=assignment_notify module=service status=error error={}",
                    err
                );
                Err(err)
            }
        }
    }
}

fn same_principal(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}
