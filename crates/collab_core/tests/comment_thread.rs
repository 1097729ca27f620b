mod common;

use collab_core::{
    AccessPolicy, CommentThread, CommentValidationError, IdentityDirectory, MentionDispatcher,
    NotificationRepository, ParentRef, ThreadError, ThreadState,
};
use common::FakeStore;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn thread_with(
    store: &Arc<FakeStore>,
    parent: ParentRef,
    policy: AccessPolicy,
) -> CommentThread<Arc<FakeStore>> {
    let notifications: Arc<dyn NotificationRepository> = store.clone();
    let identities: Arc<dyn IdentityDirectory> = store.clone();
    let dispatcher = MentionDispatcher::new(notifications, identities);
    CommentThread::new(parent, store.clone(), dispatcher, policy)
}

fn thread(store: &Arc<FakeStore>) -> CommentThread<Arc<FakeStore>> {
    thread_with(store, ParentRef::task("t-1"), AccessPolicy::open())
}

fn team() -> Arc<FakeStore> {
    Arc::new(FakeStore::with_identities(&[
        ("u-ann", "ann"),
        ("u-rita", "rita"),
    ]))
}

#[tokio::test]
async fn rejected_posts_touch_nothing() {
    let store = team();
    let thread = thread(&store);
    thread.load().await.unwrap();

    for body in ["", "   ", "<p><br></p>", "<p> </p><ul><li></li></ul>"] {
        let err = thread.post("u-ann", body).await.unwrap_err();
        assert!(matches!(
            err,
            ThreadError::Invalid(CommentValidationError::EmptyBody)
        ));
    }
    let err = thread.post("  ", "hello").await.unwrap_err();
    assert!(matches!(
        err,
        ThreadError::Invalid(CommentValidationError::MissingAuthor)
    ));

    assert_eq!(store.comment_creates.load(Ordering::SeqCst), 0);
    assert!(thread.comments().is_empty());
    assert_eq!(thread.state(), ThreadState::Loaded);
}

#[tokio::test]
async fn post_before_load_is_refused() {
    let store = team();
    let thread = thread(&store);

    let err = thread.post("u-ann", "hello").await.unwrap_err();
    assert!(matches!(err, ThreadError::NotLoaded));
    assert_eq!(store.comment_creates.load(Ordering::SeqCst), 0);
    assert_eq!(thread.state(), ThreadState::Empty);
}

#[tokio::test]
async fn unsaved_parent_has_nothing_to_load_or_post() {
    let store = team();
    let thread = thread_with(&store, ParentRef::task(""), AccessPolicy::open());

    thread.load().await.unwrap();
    assert_eq!(store.comment_fetches.load(Ordering::SeqCst), 0);
    assert_eq!(thread.state(), ThreadState::Empty);

    let err = thread.post("u-ann", "hello").await.unwrap_err();
    assert!(matches!(
        err,
        ThreadError::Invalid(CommentValidationError::MissingParent)
    ));
}

#[tokio::test]
async fn load_fetches_parent_comments_and_scrolls() {
    let store = team();
    let parent = ParentRef::task("t-1");
    store.seed_comment(&parent, "u-ann", "first");
    store.seed_comment(&ParentRef::task("t-2"), "u-ann", "other task");
    store.seed_comment(&parent, "u-rita", "second");

    let thread = thread(&store);
    let scrolled = Arc::new(Mutex::new(Vec::new()));
    let sink = scrolled.clone();
    thread.on_scroll_to_latest(move |comments| sink.lock().unwrap().push(comments.len()));

    thread.load().await.unwrap();
    let bodies: Vec<String> = thread.comments().into_iter().map(|c| c.body).collect();
    assert_eq!(bodies, vec!["first".to_string(), "second".to_string()]);
    assert_eq!(thread.state(), ThreadState::Loaded);
    assert_eq!(*scrolled.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn failed_reload_keeps_previous_list() {
    let store = team();
    let parent = ParentRef::task("t-1");
    store.seed_comment(&parent, "u-ann", "kept");
    let thread = thread(&store);
    thread.load().await.unwrap();

    FakeStore::fail(&store.fail_fetch_comments, true);
    let err = thread.load().await.unwrap_err();
    assert!(matches!(err, ThreadError::Repo(_)));
    assert_eq!(thread.comments().len(), 1);
    assert_eq!(thread.state(), ThreadState::Loaded);
}

#[tokio::test]
async fn post_appends_and_dispatches_mentions() {
    let store = team();
    let thread = thread(&store);
    let scrolled = Arc::new(Mutex::new(Vec::new()));
    let sink = scrolled.clone();
    thread.on_scroll_to_latest(move |comments| sink.lock().unwrap().push(comments.len()));
    thread.load().await.unwrap();

    let outcome = thread
        .post("u-ann", "<p>@rita can you take a look?</p>")
        .await
        .unwrap();
    assert_eq!(outcome.comment.author_id, "u-ann");
    assert_eq!(thread.comments(), vec![outcome.comment.clone()]);
    assert_eq!(*scrolled.lock().unwrap(), vec![0, 1]);

    let report = outcome.dispatch.wait().await.unwrap();
    assert_eq!(report.created, vec!["u-rita".to_string()]);
    assert_eq!(store.notifications_for("u-rita").len(), 1);
}

#[tokio::test]
async fn failed_post_leaves_list_unchanged() {
    let store = team();
    let thread = thread(&store);
    thread.load().await.unwrap();

    FakeStore::fail(&store.fail_create_comment, true);
    let err = thread.post("u-ann", "hello").await.unwrap_err();
    assert!(matches!(err, ThreadError::Repo(_)));
    assert!(thread.comments().is_empty());
    assert_eq!(thread.state(), ThreadState::Loaded);
    assert!(store.stored_notifications().is_empty());
}

#[tokio::test]
async fn dispatch_failure_does_not_fail_the_post() {
    let store = team();
    FakeStore::fail(&store.fail_create_notification, true);
    let thread = thread(&store);
    thread.load().await.unwrap();

    let outcome = thread.post("u-ann", "@rita ping").await.unwrap();
    let report = outcome.dispatch.wait().await.unwrap();
    assert_eq!(report.failed, vec!["u-rita".to_string()]);
    assert_eq!(thread.comments().len(), 1);
    assert_eq!(store.stored_comments().len(), 1);
}

#[tokio::test]
async fn read_only_authors_cannot_post() {
    let store = team();
    let policy = AccessPolicy::new(["u-lead"], ["u-guest", "u-lead"]);
    let thread = thread_with(&store, ParentRef::responsibility("r-1"), policy);
    thread.load().await.unwrap();

    let err = thread.post("u-guest", "hello").await.unwrap_err();
    assert!(matches!(err, ThreadError::Forbidden));
    assert_eq!(store.comment_creates.load(Ordering::SeqCst), 0);

    thread.post("u-lead", "hello").await.unwrap();
    assert_eq!(thread.comments().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn state_reports_posting_while_create_is_outstanding() {
    let store = team();
    store.set_create_delay(Duration::from_secs(5));
    let thread = thread(&store);
    thread.load().await.unwrap();

    let (outcome, observed) = tokio::join!(thread.post("u-ann", "slow network"), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        (thread.is_posting(), thread.state(), thread.comments().len())
    });

    assert_eq!(observed, (true, ThreadState::Posting, 0));
    outcome.unwrap();
    assert!(!thread.is_posting());
    assert_eq!(thread.state(), ThreadState::Loaded);
    assert_eq!(thread.comments().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn reload_is_refused_while_a_post_is_outstanding() {
    let store = team();
    let thread = thread(&store);
    thread.load().await.unwrap();
    store.set_create_delay(Duration::from_secs(5));

    let (outcome, reload) = tokio::join!(thread.post("u-ann", "slow network"), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        thread.load().await
    });

    assert!(matches!(reload, Err(ThreadError::Busy)));
    let comment = outcome.unwrap().comment;
    assert_eq!(thread.comments(), vec![comment]);
    assert_eq!(store.comment_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(thread.state(), ThreadState::Loaded);
}

#[tokio::test(start_paused = true)]
async fn post_is_refused_while_a_reload_is_outstanding() {
    let store = team();
    store.seed_comment(&ParentRef::task("t-1"), "u-rita", "before");
    let thread = thread(&store);
    thread.load().await.unwrap();
    store.set_comment_fetch_delay(Duration::from_secs(10));

    let (reload, post) = tokio::join!(thread.load(), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        (thread.state(), thread.post("u-ann", "too early").await)
    });

    reload.unwrap();
    assert_eq!(post.0, ThreadState::Loading);
    assert!(matches!(post.1, Err(ThreadError::Busy)));
    assert_eq!(store.comment_creates.load(Ordering::SeqCst), 0);
    assert_eq!(thread.comments().len(), 1);

    store.set_comment_fetch_delay(Duration::ZERO);
    thread.post("u-ann", "after").await.unwrap();
    thread.load().await.unwrap();
    let bodies: Vec<String> = thread.comments().into_iter().map(|c| c.body).collect();
    assert_eq!(bodies, vec!["before".to_string(), "after".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn abandoned_post_does_not_leave_thread_posting() {
    let store = team();
    let thread = thread(&store);
    thread.load().await.unwrap();
    store.set_create_delay(Duration::from_secs(5));

    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), thread.post("u-ann", "gave up")).await;
    assert!(abandoned.is_err());
    assert!(!thread.is_posting());
    assert_eq!(thread.state(), ThreadState::Loaded);

    thread.load().await.unwrap();
    assert_eq!(thread.state(), ThreadState::Loaded);
}

#[tokio::test(start_paused = true)]
async fn abandoned_load_does_not_leave_thread_loading() {
    let store = team();
    store.seed_comment(&ParentRef::task("t-1"), "u-ann", "first");
    store.set_comment_fetch_delay(Duration::from_secs(5));
    let thread = thread(&store);

    let abandoned = tokio::time::timeout(Duration::from_secs(1), thread.load()).await;
    assert!(abandoned.is_err());
    assert!(!thread.is_loading());
    assert_eq!(thread.state(), ThreadState::Empty);

    store.set_comment_fetch_delay(Duration::ZERO);
    thread.load().await.unwrap();
    assert_eq!(thread.comments().len(), 1);
    assert_eq!(thread.state(), ThreadState::Loaded);
}
