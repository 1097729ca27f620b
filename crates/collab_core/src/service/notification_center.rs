//! Notification center: polling, display list and read state.
//!
//! # Responsibility
//! - Poll the persistence service for one recipient at a fixed interval.
//! - Keep the display list and derived unread count for that recipient.
//! - Apply optimistic, best-effort read marks.
//!
//! # Invariants
//! - At most one fetch is in flight per running recipient; overlapping
//!   triggers are skipped, never queued.
//! - Results of fetches started before `stop()` or a recipient switch are
//!   discarded.
//! - After `stop()` returns, nothing started earlier mutates visible state.
//! - An id marked read locally stays read in every fetch that started before
//!   the mark-read call finished; later fetches carry server truth.
//! - Failed mark-read calls are not rolled back locally.

use crate::config::{CollabConfig, DEFAULT_POLL_INTERVAL_SECS};
use crate::model::notification::{sort_for_display, unread_count, Notification, NotificationId};
use crate::repo::notification_repo::NotificationRepository;
use crate::repo::RepoError;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug)]
pub enum CenterError {
    EmptyRecipient,
    /// `start` was called outside a tokio runtime.
    NoRuntime,
    NotRunning,
    Repo(RepoError),
}

impl Display for CenterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRecipient => write!(f, "recipient id cannot be empty"),
            Self::NoRuntime => write!(f, "notification polling requires a tokio runtime"),
            Self::NotRunning => write!(f, "notification center is not running"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CenterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::EmptyRecipient | Self::NoRuntime | Self::NotRunning => None,
        }
    }
}

impl From<RepoError> for CenterError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Result of one poll attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The list was replaced with this many notifications.
    Applied(usize),
    /// Another fetch was already in flight.
    Skipped,
    /// The center stopped or switched recipient while fetching.
    Discarded,
    /// The fetch failed; the previous list is kept and `load_failed` is set.
    Failed,
    /// No recipient is active.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMark {
    /// Mark-read call still outstanding.
    Pending,
    /// Call finished when this many fetches had been started.
    Settled(u64),
}

#[derive(Default)]
struct CenterState {
    generation: u64,
    recipient: Option<String>,
    items: Vec<Notification>,
    in_flight: bool,
    load_failed: bool,
    marks: HashMap<NotificationId, ReadMark>,
    fetches_started: u64,
    poller: Option<JoinHandle<()>>,
}

impl CenterState {
    fn reset(&mut self, recipient: Option<String>) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.generation += 1;
        self.recipient = recipient;
        self.items.clear();
        self.in_flight = false;
        self.load_failed = false;
        self.marks.clear();
    }

    fn apply_fetch(&mut self, mut items: Vec<Notification>, fetch_seq: u64) -> usize {
        for item in &mut items {
            let keep_read = match self.marks.get(&item.id) {
                Some(ReadMark::Pending) => true,
                Some(ReadMark::Settled(settled_at)) => fetch_seq <= *settled_at,
                None => false,
            };
            if keep_read {
                item.mark_read();
            }
        }
        self.marks.retain(|_, mark| match mark {
            ReadMark::Pending => true,
            ReadMark::Settled(settled_at) => fetch_seq <= *settled_at,
        });
        sort_for_display(&mut items);
        self.items = items;
        self.load_failed = false;
        self.items.len()
    }
}

struct Inner<R> {
    repo: R,
    poll_interval: Duration,
    state: Mutex<CenterState>,
}

/// Clears the in-flight flag if a fetch future is dropped mid-await.
struct InFlightGuard<'a, R> {
    inner: &'a Inner<R>,
    generation: u64,
    armed: bool,
}

impl<R> Drop for InFlightGuard<'_, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.state();
        if state.generation == self.generation {
            state.in_flight = false;
        }
    }
}

impl<R> Inner<R> {
    fn state(&self) -> MutexGuard<'_, CenterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: NotificationRepository> Inner<R> {
    async fn refresh(&self) -> PollOutcome {
        let (recipient, generation, fetch_seq) = {
            let mut state = self.state();
            let Some(recipient) = state.recipient.clone() else {
                return PollOutcome::Idle;
            };
            if state.in_flight {
                debug!("event=notification_poll module=service status=skipped reason=in_flight");
                return PollOutcome::Skipped;
            }
            state.in_flight = true;
            state.fetches_started += 1;
            (recipient, state.generation, state.fetches_started)
        };
        let mut guard = InFlightGuard {
            inner: self,
            generation,
            armed: true,
        };

        let started_at = Instant::now();
        let result = self.repo.fetch_notifications(&recipient).await;

        let mut state = self.state();
        guard.armed = false;
        if state.generation != generation {
            debug!("event=notification_poll module=service status=skipped reason=stale_result");
            return PollOutcome::Discarded;
        }
        state.in_flight = false;

        match result {
            Ok(items) => {
                let count = state.apply_fetch(items, fetch_seq);
                let unread = unread_count(&state.items);
                debug!(
                    "event=notification_poll module=service status=ok count={} unread={} duration_ms={}",
                    count,
                    unread,
                    started_at.elapsed().as_millis()
                );
                PollOutcome::Applied(count)
            }
            Err(err) => {
                state.load_failed = true;
                error!(
                    "event=notification_poll module=service status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                PollOutcome::Failed
            }
        }
    }
}

/// Polls and presents notifications for the active recipient.
///
/// Dropping the center stops it.
pub struct NotificationCenter<R: NotificationRepository + 'static> {
    inner: Arc<Inner<R>>,
}

impl<R: NotificationRepository + 'static> NotificationCenter<R> {
    /// A zero interval falls back to the default of 30 seconds.
    pub fn new(repo: R, poll_interval: Duration) -> Self {
        let poll_interval = if poll_interval.is_zero() {
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
        } else {
            poll_interval
        };
        Self {
            inner: Arc::new(Inner {
                repo,
                poll_interval,
                state: Mutex::new(CenterState::default()),
            }),
        }
    }

    pub fn from_config(repo: R, config: &CollabConfig) -> Self {
        Self::new(repo, config.poll_interval())
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    /// Starts polling for `recipient_id`: one fetch now, then one per interval.
    ///
    /// Restarting with the active recipient is a no-op; a different
    /// recipient replaces the current one and drops its list.
    pub fn start(&self, recipient_id: &str) -> Result<(), CenterError> {
        let recipient = recipient_id.trim();
        if recipient.is_empty() {
            return Err(CenterError::EmptyRecipient);
        }
        let runtime = Handle::try_current().map_err(|_| CenterError::NoRuntime)?;

        let mut state = self.inner.state();
        if state.recipient.as_deref() == Some(recipient) && state.poller.is_some() {
            return Ok(());
        }
        state.reset(Some(recipient.to_string()));
        let generation = state.generation;
        let poller = runtime.spawn(poll_loop(
            Arc::downgrade(&self.inner),
            generation,
            self.inner.poll_interval,
        ));
        state.poller = Some(poller);

        info!(
            "event=notification_poll module=service status=start interval_ms={}",
            self.inner.poll_interval.as_millis()
        );
        Ok(())
    }

    /// Stops polling. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = self.inner.state();
        if state.recipient.is_none() && state.poller.is_none() {
            return;
        }
        state.reset(None);
        info!("event=notification_poll module=service status=stopped");
    }

    /// Runs one single-flight poll now.
    pub async fn refresh(&self) -> PollOutcome {
        self.inner.refresh().await
    }

    /// Marks `id` read locally, then confirms with the persistence service.
    ///
    /// Returns the service's answer. On error the local flag stays set.
    pub async fn mark_read(&self, id: NotificationId) -> Result<bool, CenterError> {
        let generation = {
            let mut state = self.inner.state();
            if state.recipient.is_none() {
                return Err(CenterError::NotRunning);
            }
            if let Some(item) = state.items.iter_mut().find(|item| item.id == id) {
                item.mark_read();
            }
            state.marks.insert(id, ReadMark::Pending);
            state.generation
        };

        let result = self.inner.repo.mark_notification_as_read(id).await;

        {
            let mut state = self.inner.state();
            if state.generation == generation {
                let settled_at = state.fetches_started;
                state.marks.insert(id, ReadMark::Settled(settled_at));
            }
        }

        match result {
            Ok(found) => {
                info!(
                    "event=notification_mark_read module=service status=ok notification_id={} found={}",
                    id, found
                );
                Ok(found)
            }
            Err(err) => {
                warn!(
                    "event=notification_mark_read module=service status=error notification_id={} error={}",
                    id, err
                );
                Err(err.into())
            }
        }
    }

    /// Current list, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.state().items.clone()
    }

    pub fn unread_count(&self) -> usize {
        unread_count(&self.inner.state().items)
    }

    pub fn recipient(&self) -> Option<String> {
        self.inner.state().recipient.clone()
    }

    /// Whether the latest fetch failed.
    pub fn load_failed(&self) -> bool {
        self.inner.state().load_failed
    }

    pub fn is_running(&self) -> bool {
        let state = self.inner.state();
        state.recipient.is_some() && state.poller.is_some()
    }
}

impl<R: NotificationRepository + 'static> Drop for NotificationCenter<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop<R: NotificationRepository + 'static>(
    inner: Weak<Inner<R>>,
    generation: u64,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.state().generation != generation {
            break;
        }
        // Detached so a slow fetch does not delay the next tick; that tick
        // then sees the fetch in flight and is skipped.
        tokio::spawn(async move {
            inner.refresh().await;
        });
    }
}
