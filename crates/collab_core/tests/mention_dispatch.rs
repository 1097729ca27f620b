mod common;

use collab_core::{
    DispatchError, Identity, IdentityDirectory, MentionDispatcher, MentionPayload,
    NotificationKind, NotificationRepository, ParentRef, ParentType, RepoResult, TaskAssignment,
};
use common::FakeStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn dispatcher(store: &Arc<FakeStore>) -> MentionDispatcher {
    let notifications: Arc<dyn NotificationRepository> = store.clone();
    let identities: Arc<dyn IdentityDirectory> = store.clone();
    MentionDispatcher::new(notifications, identities)
}

fn team() -> Arc<FakeStore> {
    Arc::new(FakeStore::with_identities(&[
        ("u-ann", "ann"),
        ("u-james", "james.strutt"),
        ("u-rita", "rita"),
    ]))
}

#[tokio::test]
async fn review_request_notifies_each_mentioned_colleague() {
    let store = team();
    let parent = ParentRef::task("t-42");
    let comment_id = Uuid::new_v4();

    let report = dispatcher(&store)
        .create_mention_notifications(
            "<p>@james.strutt and @rita please review.</p>",
            "u-ann",
            &parent,
            Some(comment_id),
        )
        .await;

    assert_eq!(report.created.len(), 2);
    assert!(report.unresolved.is_empty());
    assert!(report.failed.is_empty());

    let james = store.notifications_for("u-james");
    assert_eq!(james.len(), 1);
    assert_eq!(james[0].kind, NotificationKind::Mention);
    let payload: MentionPayload = james[0].payload_as().unwrap();
    assert_eq!(payload.author_id, "u-ann");
    assert_eq!(payload.parent_type, ParentType::Task);
    assert_eq!(payload.parent_id, "t-42");
    assert_eq!(payload.comment_id, Some(comment_id));
    assert_eq!(payload.excerpt, "@james.strutt and @rita please review.");
    assert_eq!(store.notifications_for("u-rita").len(), 1);
}

#[tokio::test]
async fn author_never_notifies_themselves() {
    let store = team();
    let report = dispatcher(&store)
        .create_mention_notifications(
            "note to self @ann, ping @rita",
            "U-ANN",
            &ParentRef::task("t-1"),
            None,
        )
        .await;

    assert_eq!(report.self_mentions, 1);
    assert_eq!(report.created, vec!["u-rita".to_string()]);
    assert!(store.notifications_for("u-ann").is_empty());
}

#[tokio::test]
async fn unknown_names_are_dropped_without_error() {
    let store = team();
    let report = dispatcher(&store)
        .create_mention_notifications(
            "@ghost and mail ann@corp.example",
            "u-rita",
            &ParentRef::task("t-1"),
            None,
        )
        .await;

    assert_eq!(report.unresolved, vec!["ghost".to_string()]);
    assert!(report.created.is_empty());
    assert!(store.stored_notifications().is_empty());
}

#[tokio::test]
async fn names_resolving_to_one_account_notify_once() {
    let store = team();
    let report = dispatcher(&store)
        .create_mention_notifications(
            "@Rita @rita @RITA.",
            "u-ann",
            &ParentRef::responsibility("r-1"),
            None,
        )
        .await;

    assert_eq!(report.created, vec!["u-rita".to_string()]);
    assert_eq!(store.notifications_for("u-rita").len(), 1);
}

#[tokio::test]
async fn failures_are_reported_not_raised() {
    let store = team();
    FakeStore::fail(&store.fail_create_notification, true);
    let report = dispatcher(&store)
        .create_mention_notifications("@rita", "u-ann", &ParentRef::task("t-1"), None)
        .await;
    assert_eq!(report.failed, vec!["u-rita".to_string()]);
    assert!(report.created.is_empty());

    FakeStore::fail(&store.fail_create_notification, false);
    FakeStore::fail(&store.fail_resolve, true);
    let report = dispatcher(&store)
        .create_mention_notifications("@rita", "u-ann", &ParentRef::task("t-1"), None)
        .await;
    assert_eq!(report.failed, vec!["rita".to_string()]);
}

#[tokio::test]
async fn body_without_mentions_does_no_lookups() {
    let store = team();
    let report = dispatcher(&store)
        .create_mention_notifications(
            "<p>all good</p>",
            "u-ann",
            &ParentRef::task("t-1"),
            None,
        )
        .await;
    assert_eq!(report, Default::default());
    assert!(store.stored_notifications().is_empty());
}

#[tokio::test]
async fn spawned_dispatch_can_be_awaited() {
    let store = team();
    let handle = dispatcher(&store).spawn(
        "@rita".to_string(),
        "u-ann".to_string(),
        ParentRef::task("t-1"),
        None,
    );

    let report = handle.wait().await.unwrap();
    assert_eq!(report.created, vec!["u-rita".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn cancelled_dispatch_reports_cancellation() {
    let store = team();
    let slow = Arc::new(SlowIdentities);
    let notifications: Arc<dyn NotificationRepository> = store.clone();
    let dispatcher = MentionDispatcher::new(notifications, slow);
    let handle = dispatcher.spawn(
        "@rita".to_string(),
        "u-ann".to_string(),
        ParentRef::task("t-1"),
        None,
    );
    tokio::task::yield_now().await;
    assert!(!handle.is_finished());

    handle.cancel();
    assert_eq!(handle.wait().await.unwrap_err(), DispatchError::Cancelled);
    assert!(store.stored_notifications().is_empty());
}

#[test]
fn spawn_outside_runtime_reports_no_runtime() {
    let store = team();
    let handle = dispatcher(&store).spawn(
        "@rita".to_string(),
        "u-ann".to_string(),
        ParentRef::task("t-1"),
        None,
    );
    assert!(handle.is_finished());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let err = runtime.block_on(handle.wait()).unwrap_err();
    assert_eq!(err, DispatchError::NoRuntime);
    assert!(store.stored_notifications().is_empty());
}

#[tokio::test]
async fn assignment_notifies_assignee_but_not_self() {
    let store = team();
    let dispatcher = dispatcher(&store);

    let own = TaskAssignment {
        task_id: "t-7".to_string(),
        task_title: "Ship it".to_string(),
        assignee_id: "u-ann".to_string(),
        assigned_by: "u-ann".to_string(),
    };
    assert!(dispatcher.notify_assignment(&own).await.unwrap().is_none());

    let handoff = TaskAssignment {
        assignee_id: "u-rita".to_string(),
        ..own
    };
    let created = dispatcher.notify_assignment(&handoff).await.unwrap().unwrap();
    assert_eq!(created.recipient_id, "u-rita");
    assert_eq!(created.kind, NotificationKind::Assignment);
    assert_eq!(created.describe(), "u-ann assigned you \"Ship it\"");
    assert_eq!(store.notifications_for("u-rita").len(), 1);
}

/// Identity lookup that never finishes within the test's virtual time.
struct SlowIdentities;

#[async_trait::async_trait]
impl IdentityDirectory for SlowIdentities {
    async fn resolve_name(&self, _raw_name: &str) -> RepoResult<Option<Identity>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(None)
    }
}
