use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use coachdeck::api::{
    AccountabilityMember, ApiError, ChangeEvent, OwnerScope, Row, SyncedEntity, Task,
};
use coachdeck::store::StoreOp;
use coachdeck::testing::fixtures::{member_row, task_row, task_row_at};
use coachdeck::views::{DerivedView, LeaderboardEntry, leaderboard};
use coachdeck::{EntitySync, MemoryStore, SyncOutcome, SyncState};

fn scope(id: &str) -> OwnerScope {
    OwnerScope::new(id).unwrap()
}

fn setup() -> (MemoryStore, EntitySync<Task>) {
    let store = MemoryStore::new();
    let sync = EntitySync::<Task>::new(Arc::new(store.clone()));
    (store, sync)
}

/// Wait until the mirror's state satisfies `pred`.
async fn wait_for<T: SyncedEntity>(
    sync: &EntitySync<T>,
    pred: impl Fn(&SyncState<T>) -> bool,
) -> Result<()> {
    let mut changes = sync.changes();
    timeout(Duration::from_secs(2), async {
        while !pred(&sync.snapshot()) {
            if changes.changed().await.is_err() {
                break;
            }
        }
    })
    .await?;
    Ok(())
}

fn ids(sync: &EntitySync<Task>) -> Vec<String> {
    let mut ids: Vec<String> = sync.items().into_iter().map(|t| t.id).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_zero_rows_is_empty_state_not_error() -> Result<()> {
    let (_store, sync) = setup();

    let outcome = sync.initialize(&scope("coach-1")).await;
    assert_eq!(outcome, SyncOutcome::Loaded(0));

    let state = sync.snapshot();
    assert!(state.is_empty_state());
    assert!(state.error.is_none());
    assert!(!state.loading);
    Ok(())
}

#[tokio::test]
async fn test_failed_initialize_sets_error_and_clears_items() -> Result<()> {
    let (store, sync) = setup();
    store.seed("tasks", [task_row("t1", "coach-1", "Plan week")]);
    sync.initialize(&scope("coach-1")).await;
    assert_eq!(sync.len(), 1);

    store.fail_next(StoreOp::Query, ApiError::store("connection refused"));
    let outcome = sync.initialize(&scope("coach-1")).await;
    assert!(matches!(outcome, SyncOutcome::Failed(ApiError::Store { .. })));

    let state = sync.snapshot();
    assert!(state.items.is_empty());
    assert!(!state.loading);
    assert!(!state.is_empty_state());
    assert_eq!(state.error, Some(ApiError::store("connection refused")));

    // No automatic retry
    assert_eq!(store.call_count(StoreOp::Query), 2);
    Ok(())
}

#[tokio::test]
async fn test_initialize_is_owner_scoped_and_ordered() -> Result<()> {
    let (store, sync) = setup();
    let now = Utc::now();
    store.seed(
        "tasks",
        [
            task_row_at("old", "coach-1", "a", now - ChronoDuration::days(2)),
            task_row_at("other", "coach-2", "b", now),
            task_row_at("new", "coach-1", "c", now),
        ],
    );

    sync.initialize(&scope("coach-1")).await;
    let order: Vec<String> = sync.items().into_iter().map(|t| t.id).collect();
    assert_eq!(order, vec!["new".to_string(), "old".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_insert_is_present_once() -> Result<()> {
    let (store, sync) = setup();
    let owner = scope("coach-1");
    sync.initialize(&owner).await;
    sync.subscribe(&owner).await?;

    let five = task_row("5", "coach-1", "Follow up");
    store.push_event(ChangeEvent::insert("tasks", five.clone()));
    store.push_event(ChangeEvent::insert("tasks", five));
    store.push_event(ChangeEvent::insert("tasks", task_row("6", "coach-1", "sentinel")));

    wait_for(&sync, |s| s.items.iter().any(|t| t.id == "6")).await?;
    assert_eq!(ids(&sync), vec!["5".to_string(), "6".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_changes_for_absent_ids_leave_collection_unchanged() -> Result<()> {
    let (store, sync) = setup();
    let owner = scope("coach-1");
    store.seed("tasks", [task_row("t1", "coach-1", "Keep me")]);
    sync.initialize(&owner).await;
    sync.subscribe(&owner).await?;
    let before = sync.items();

    store.push_event(ChangeEvent::update("tasks", task_row("ghost", "coach-1", "x")));
    store.push_event(ChangeEvent::delete(
        "tasks",
        json!({"id": "ghost", "user_id": "coach-1"}).as_object().cloned().unwrap_or_default(),
    ));
    store.push_event(ChangeEvent::insert("tasks", task_row("sentinel", "coach-1", "s")));
    wait_for(&sync, |s| s.items.len() == 2).await?;

    let after: Vec<Task> = sync.items().into_iter().filter(|t| t.id != "sentinel").collect();
    assert_eq!(after, before);
    Ok(())
}

#[tokio::test]
async fn test_update_after_delete_does_not_resurrect() -> Result<()> {
    let (store, sync) = setup();
    let owner = scope("coach-1");
    store.seed("tasks", [task_row("t1", "coach-1", "Doomed")]);
    sync.initialize(&owner).await;
    sync.subscribe(&owner).await?;

    store.push_event(ChangeEvent::delete("tasks", task_row("t1", "coach-1", "Doomed")));
    store.push_event(ChangeEvent::update("tasks", task_row("t1", "coach-1", "Late edit")));
    store.push_event(ChangeEvent::insert("tasks", task_row("sentinel", "coach-1", "s")));
    wait_for(&sync, |s| s.items.iter().any(|t| t.id == "sentinel")).await?;

    assert_eq!(ids(&sync), vec!["sentinel".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_late_fetch_after_teardown_is_discarded() -> Result<()> {
    let (store, sync) = setup();
    store.seed("tasks", [task_row("t1", "coach-1", "Too late")]);
    store.set_query_delay(Some(Duration::from_millis(100)));
    let sync = Arc::new(sync);

    let pending = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.initialize(&scope("coach-1")).await })
    };
    sleep(Duration::from_millis(20)).await;
    sync.teardown();

    assert_eq!(pending.await?, SyncOutcome::Discarded);
    assert!(sync.items().is_empty());
    assert!(!sync.is_alive());
    assert_eq!(sync.initialize(&scope("coach-1")).await, SyncOutcome::Discarded);
    Ok(())
}

#[tokio::test]
async fn test_superseded_initialize_is_discarded() -> Result<()> {
    let (store, sync) = setup();
    store.seed("tasks", [task_row("t1", "coach-1", "a")]);
    store.set_query_delay(Some(Duration::from_millis(150)));
    let sync = Arc::new(sync);

    let slow = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.initialize(&scope("coach-1")).await })
    };
    sleep(Duration::from_millis(20)).await;
    store.set_query_delay(None);

    assert_eq!(sync.initialize(&scope("coach-1")).await, SyncOutcome::Loaded(1));
    assert_eq!(slow.await?, SyncOutcome::Discarded);
    Ok(())
}

#[tokio::test]
async fn test_teardown_unsubscribes_and_is_idempotent() -> Result<()> {
    let (store, sync) = setup();
    let owner = scope("coach-1");
    sync.initialize(&owner).await;
    assert_eq!(sync.subscribe(&owner).await?, SyncOutcome::Subscribed);
    assert_eq!(store.active_subscriptions(Some("tasks")), 1);

    sync.teardown();
    assert_eq!(store.active_subscriptions(Some("tasks")), 0);
    assert!(!sync.snapshot().subscribed);
    sync.teardown();

    // Events after teardown go nowhere
    store.push_event(ChangeEvent::insert("tasks", task_row("t9", "coach-1", "x")));
    sleep(Duration::from_millis(20)).await;
    assert!(sync.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_drop_releases_subscription() -> Result<()> {
    let store = MemoryStore::new();
    {
        let sync = EntitySync::<Task>::new(Arc::new(store.clone()));
        sync.subscribe(&scope("coach-1")).await?;
        assert_eq!(store.active_subscriptions(None), 1);
    }
    assert_eq!(store.active_subscriptions(None), 0);
    Ok(())
}

#[tokio::test]
async fn test_resubscribe_replaces_previous_feed() -> Result<()> {
    let (store, sync) = setup();
    let owner = scope("coach-1");
    sync.subscribe(&owner).await?;
    sync.subscribe(&owner).await?;
    assert_eq!(store.active_subscriptions(Some("tasks")), 1);
    Ok(())
}

#[tokio::test]
async fn test_reconnect_refetches_missed_rows() -> Result<()> {
    let (store, sync) = setup();
    let owner = scope("coach-1");
    store.seed("tasks", [task_row("t1", "coach-1", "kept")]);
    sync.initialize(&owner).await;
    sync.subscribe(&owner).await?;

    // Changed while the feed was down: no events for either
    store.seed("tasks", [task_row("t2", "coach-1", "missed")]);
    store.push_reconnect();
    wait_for(&sync, |s| s.items.len() == 2 && !s.stale).await?;

    let state = sync.snapshot();
    assert!(!state.stale);
    assert!(state.subscribed);
    assert_eq!(ids(&sync), vec!["t1", "t2"]);
    assert_eq!(store.call_count(StoreOp::Query), 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_refetch_leaves_mirror_stale() -> Result<()> {
    let (store, sync) = setup();
    let owner = scope("coach-1");
    store.seed("tasks", [task_row("t1", "coach-1", "kept")]);
    sync.initialize(&owner).await;
    sync.subscribe(&owner).await?;

    store.fail_next(StoreOp::Query, ApiError::store("connection refused"));
    store.push_reconnect();
    wait_for(&sync, |s| s.stale).await?;
    timeout(Duration::from_secs(2), async {
        while store.call_count(StoreOp::Query) < 2 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    sleep(Duration::from_millis(20)).await;

    let state = sync.snapshot();
    assert!(state.stale);
    assert_eq!(ids(&sync), vec!["t1"]);

    sync.initialize(&owner).await;
    assert!(!sync.snapshot().stale);
    Ok(())
}

#[tokio::test]
async fn test_feed_insert_lands_in_snapshot_order() -> Result<()> {
    let (store, sync) = setup();
    let owner = scope("coach-1");
    let now = Utc::now();
    store.seed(
        "tasks",
        [
            task_row_at("t1", "coach-1", "older", now - ChronoDuration::days(2)),
            task_row_at("t2", "coach-1", "newer", now - ChronoDuration::days(1)),
        ],
    );
    sync.initialize(&owner).await;
    sync.subscribe(&owner).await?;

    store.push_event(ChangeEvent::insert("tasks", task_row_at("t3", "coach-1", "newest", now)));
    store.push_event(ChangeEvent::insert(
        "tasks",
        task_row_at("t0", "coach-1", "oldest", now - ChronoDuration::days(3)),
    ));
    wait_for(&sync, |s| s.items.len() == 4).await?;

    let order: Vec<String> = sync.items().into_iter().map(|t| t.id).collect();
    assert_eq!(order, vec!["t3", "t2", "t1", "t0"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replaced_feed_task_keeps_subscribed_flag() -> Result<()> {
    let (store, sync) = setup();
    let owner = scope("coach-1");
    for _ in 0..20 {
        sync.subscribe(&owner).await?;
    }
    sleep(Duration::from_millis(50)).await;

    assert!(sync.snapshot().subscribed);
    assert_eq!(store.active_subscriptions(Some("tasks")), 1);

    sync.teardown();
    assert!(!sync.snapshot().subscribed);
    Ok(())
}

#[tokio::test]
async fn test_foreign_and_malformed_events_are_dropped() -> Result<()> {
    let (store, sync) = setup();
    let owner = scope("coach-1");
    sync.initialize(&owner).await;
    sync.subscribe(&owner).await?;

    store.push_event_unfiltered(ChangeEvent::insert("tasks", task_row("x1", "coach-2", "theirs")));
    let mut missing_id: Row = task_row("", "coach-1", "no id");
    missing_id.remove("id");
    store.push_event(ChangeEvent::insert("tasks", missing_id));
    let mut bad_types = task_row("x2", "coach-1", "bad");
    bad_types.insert("completed".to_string(), json!("not a bool"));
    store.push_event(ChangeEvent::insert("tasks", bad_types));
    store.push_event(ChangeEvent::insert("tasks", task_row("ok", "coach-1", "fine")));

    wait_for(&sync, |s| !s.items.is_empty()).await?;
    assert_eq!(ids(&sync), vec!["ok".to_string()]);
    assert!(sync.snapshot().error.is_none());
    Ok(())
}

#[tokio::test]
async fn test_confirmed_writes_merge_and_failures_leave_state() -> Result<()> {
    let (store, sync) = setup();
    let owner = scope("coach-1");
    sync.initialize(&owner).await;

    let mut draft = Row::new();
    draft.insert("title".to_string(), json!("Call Ada"));
    let created = sync.create(draft).await?;
    assert_eq!(created.user_id, "coach-1");
    assert_eq!(sync.len(), 1);

    store.fail_next(StoreOp::Update, ApiError::store("timeout"));
    let mut patch = Row::new();
    patch.insert("completed".to_string(), json!(true));
    assert!(sync.update(&created.id, patch.clone()).await.is_err());
    assert!(!sync.get(&created.id).map(|t| t.completed).unwrap_or(true));

    let updated = sync.update(&created.id, patch).await?;
    assert!(updated.completed);
    assert_eq!(sync.get(&created.id), Some(updated));

    assert!(sync.delete("missing").await.unwrap_err().is_not_found());
    sync.delete(&created.id).await?;
    assert!(sync.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_local_write_and_feed_echo_converge() -> Result<()> {
    let (_store, sync) = setup();
    let owner = scope("coach-1");
    sync.initialize(&owner).await;
    sync.subscribe(&owner).await?;

    let mut draft = Row::new();
    draft.insert("title".to_string(), json!("Echoed"));
    let created = sync.create(draft).await?;

    // The store echoes the insert on the feed; give it a moment to arrive
    sleep(Duration::from_millis(20)).await;
    assert_eq!(ids(&sync), vec![created.id]);
    Ok(())
}

#[tokio::test]
async fn test_writes_require_initialized_scope() -> Result<()> {
    let (_store, sync) = setup();
    let err = sync.create(Row::new()).await.unwrap_err();
    assert_eq!(err, ApiError::Unauthenticated);
    Ok(())
}

#[tokio::test]
async fn test_derived_view_recomputes_on_each_change() -> Result<()> {
    let store = MemoryStore::new();
    store.seed(
        "accountability_members",
        [
            member_row("m1", "coach-1", "Ada", 10, 0),
            member_row("m2", "coach-1", "Grace", 4, 1),
        ],
    );
    let members = EntitySync::<AccountabilityMember>::new(Arc::new(store.clone()));
    let board: Arc<DerivedView<AccountabilityMember, Vec<LeaderboardEntry>>> =
        Arc::new(DerivedView::new(leaderboard));
    members.add_observer(board.clone());

    let owner = scope("coach-1");
    members.initialize(&owner).await;
    members.subscribe(&owner).await?;
    assert_eq!(board.get()[0].id, "m1");

    let mut bump = member_row("m2", "coach-1", "Grace", 20, 1);
    bump.insert(
        "updated_at".to_string(),
        json!((Utc::now() + ChronoDuration::seconds(5)).to_rfc3339()),
    );
    store.push_event(ChangeEvent::update("accountability_members", bump));
    wait_for(&members, |s| s.items.iter().any(|m| m.points == 20)).await?;

    let top: Vec<(usize, String)> = board.get().into_iter().map(|e| (e.rank, e.id)).collect();
    assert_eq!(top, vec![(1, "m2".to_string()), (2, "m1".to_string())]);
    Ok(())
}
