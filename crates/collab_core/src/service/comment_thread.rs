//! Comment thread controller.
//!
//! # Responsibility
//! - Load the comments of one parent entity and append newly posted ones.
//! - Hand mention notifications off to a background dispatch task.
//!
//! # Invariants
//! - Rejected posts perform no I/O and no state transition.
//! - The list is append-only after load; posts land in completion order.
//! - Loading and posting never overlap, so a reload cannot drop a new post.
//! - Busy flags are reset even when a `load` or `post` future is dropped.
//! - Dispatch failure never rolls back or fails a persisted comment.
//! - Scroll-to-latest handlers run after the list holds the new state.
//!
//! # See also
//! - `crate::service::mention_dispatch` for notification fan-out.

use crate::model::comment::{
    has_visible_text, Comment, CommentDraft, CommentValidationError, ParentRef,
};
use crate::policy::AccessPolicy;
use crate::repo::comment_repo::CommentRepository;
use crate::repo::RepoError;
use crate::service::mention_dispatch::{DispatchHandle, MentionDispatcher};
use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Empty,
    Loading,
    Loaded,
    Posting,
}

#[derive(Debug)]
pub enum ThreadError {
    Invalid(CommentValidationError),
    /// The author may read but not comment.
    Forbidden,
    /// `post` was called before a successful `load`.
    NotLoaded,
    /// A load is running, or a load was requested while posts are in flight.
    Busy,
    Repo(RepoError),
}

impl Display for ThreadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(err) => write!(f, "{err}"),
            Self::Forbidden => write!(f, "author is not allowed to comment"),
            Self::NotLoaded => write!(f, "thread has not been loaded"),
            Self::Busy => write!(f, "thread is busy loading or posting"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ThreadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invalid(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Forbidden | Self::NotLoaded | Self::Busy => None,
        }
    }
}

impl From<CommentValidationError> for ThreadError {
    fn from(value: CommentValidationError) -> Self {
        Self::Invalid(value)
    }
}

impl From<RepoError> for ThreadError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Result of an accepted and persisted post.
#[derive(Debug)]
pub struct PostOutcome {
    pub comment: Comment,
    /// Background mention dispatch for the new comment.
    pub dispatch: DispatchHandle,
}

type ScrollHandler = Box<dyn Fn(&[Comment]) + Send + Sync>;

#[derive(Default)]
struct ThreadInner {
    comments: Vec<Comment>,
    loaded: bool,
    loading: bool,
    posts_in_flight: usize,
}

/// Clears `loading` if a load future is dropped mid-await.
struct LoadingGuard<'a> {
    inner: &'a Mutex<ThreadInner>,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock_inner(self.inner).loading = false;
        }
    }
}

/// Releases one in-flight post if a post future is dropped mid-await.
struct PostingGuard<'a> {
    inner: &'a Mutex<ThreadInner>,
    armed: bool,
}

impl Drop for PostingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = lock_inner(self.inner);
            inner.posts_in_flight = inner.posts_in_flight.saturating_sub(1);
        }
    }
}

fn lock_inner(inner: &Mutex<ThreadInner>) -> MutexGuard<'_, ThreadInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Controller for the comments of one `(parent_type, parent_id)`.
pub struct CommentThread<R: CommentRepository> {
    parent: ParentRef,
    repo: R,
    dispatcher: MentionDispatcher,
    policy: AccessPolicy,
    inner: Mutex<ThreadInner>,
    scroll_handlers: Mutex<Vec<ScrollHandler>>,
}

impl<R: CommentRepository> CommentThread<R> {
    pub fn new(
        parent: ParentRef,
        repo: R,
        dispatcher: MentionDispatcher,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            parent,
            repo,
            dispatcher,
            policy,
            inner: Mutex::new(ThreadInner::default()),
            scroll_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn parent(&self) -> &ParentRef {
        &self.parent
    }

    pub fn state(&self) -> ThreadState {
        let inner = self.inner();
        if inner.loading {
            ThreadState::Loading
        } else if inner.posts_in_flight > 0 {
            ThreadState::Posting
        } else if inner.loaded {
            ThreadState::Loaded
        } else {
            ThreadState::Empty
        }
    }

    /// Snapshot of the current list, oldest first.
    pub fn comments(&self) -> Vec<Comment> {
        self.inner().comments.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner().loading
    }

    pub fn is_posting(&self) -> bool {
        self.inner().posts_in_flight > 0
    }

    /// Registers a presentation hook run after load and after each post.
    pub fn on_scroll_to_latest(&self, handler: impl Fn(&[Comment]) + Send + Sync + 'static) {
        self.scroll_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(handler));
    }

    /// Fetches the full list. A parent without an id has nothing to load.
    ///
    /// On failure the previous list and state are kept. Returns `Busy`
    /// while another load or any post is outstanding.
    pub async fn load(&self) -> Result<(), ThreadError> {
        if !self.parent.is_persisted() {
            debug!("event=comment_load module=service status=skipped reason=missing_parent");
            return Ok(());
        }

        let started_at = Instant::now();
        let mut guard = {
            let mut inner = self.inner();
            if inner.loading || inner.posts_in_flight > 0 {
                debug!(
                    "event=comment_load module=service status=skipped parent={} reason=busy",
                    self.parent
                );
                return Err(ThreadError::Busy);
            }
            inner.loading = true;
            LoadingGuard {
                inner: &self.inner,
                armed: true,
            }
        };
        info!(
            "event=comment_load module=service status=start parent={}",
            self.parent
        );

        let result = self.repo.fetch_comments(&self.parent).await;
        let snapshot = {
            let mut inner = self.inner();
            guard.armed = false;
            inner.loading = false;
            match result {
                Ok(comments) => {
                    inner.comments = comments;
                    inner.loaded = true;
                    inner.comments.clone()
                }
                Err(err) => {
                    error!(
                        "event=comment_load module=service status=error parent={} duration_ms={} error={}",
                        self.parent,
                        started_at.elapsed().as_millis(),
                        err
                    );
                    return Err(err.into());
                }
            }
        };

        info!(
            "event=comment_load module=service status=ok parent={} count={} duration_ms={}",
            self.parent,
            snapshot.len(),
            started_at.elapsed().as_millis()
        );
        self.scroll_to_latest(&snapshot);
        Ok(())
    }

    /// Persists a comment and starts mention dispatch for it.
    ///
    /// # Errors
    /// - `Invalid` for a missing author or parent, or a body without visible text.
    /// - `Forbidden` for read-only authors.
    /// - `Busy` while a load is outstanding.
    /// - `NotLoaded` before the first successful `load`.
    /// - `Repo` when persisting the comment fails; nothing is appended.
    pub async fn post(&self, author_id: &str, raw_body: &str) -> Result<PostOutcome, ThreadError> {
        let draft = CommentDraft::new(self.parent.clone(), author_id.trim(), raw_body);
        let mut guard = match self.begin_post(&draft) {
            Ok(guard) => guard,
            Err(err) => {
                debug!(
                    "event=comment_post module=service status=skipped parent={} reason={}",
                    self.parent, err
                );
                return Err(err);
            }
        };

        let started_at = Instant::now();
        let result = self.repo.create_comment(&draft).await;

        let snapshot = {
            let mut inner = self.inner();
            guard.armed = false;
            inner.posts_in_flight = inner.posts_in_flight.saturating_sub(1);
            match &result {
                Ok(comment) => {
                    inner.comments.push(comment.clone());
                    Some(inner.comments.clone())
                }
                Err(_) => None,
            }
        };

        let comment = match result {
            Ok(comment) => comment,
            Err(err) => {
                error!(
                    "event=comment_post module=service status=error parent={} duration_ms={} error={}",
                    self.parent,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        info!(
            "event=comment_post module=service status=ok parent={} comment_id={} duration_ms={}",
            self.parent,
            comment.id,
            started_at.elapsed().as_millis()
        );
        if let Some(snapshot) = snapshot {
            self.scroll_to_latest(&snapshot);
        }

        let dispatch = self.dispatcher.spawn(
            comment.body.clone(),
            comment.author_id.clone(),
            self.parent.clone(),
            Some(comment.id),
        );
        Ok(PostOutcome { comment, dispatch })
    }

    /// Validates the draft and reserves a post slot in one step.
    fn begin_post(&self, draft: &CommentDraft) -> Result<PostingGuard<'_>, ThreadError> {
        if draft.author_id.is_empty() {
            return Err(CommentValidationError::MissingAuthor.into());
        }
        if !has_visible_text(&draft.body) {
            return Err(CommentValidationError::EmptyBody.into());
        }
        draft.validate()?;
        if !self.policy.can_comment(&draft.author_id) {
            return Err(ThreadError::Forbidden);
        }
        let mut inner = self.inner();
        if inner.loading {
            return Err(ThreadError::Busy);
        }
        if !inner.loaded {
            return Err(ThreadError::NotLoaded);
        }
        inner.posts_in_flight += 1;
        Ok(PostingGuard {
            inner: &self.inner,
            armed: true,
        })
    }

    fn scroll_to_latest(&self, comments: &[Comment]) {
        let handlers = self
            .scroll_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for handler in handlers.iter() {
            handler(comments);
        }
    }

    fn inner(&self) -> MutexGuard<'_, ThreadInner> {
        lock_inner(&self.inner)
    }
}
