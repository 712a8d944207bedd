use crate::common::*;
use futures::StreamExt;
use query_storage::models::{Checkpoint, PropertyValue, QueryKey, TaskAction};
use query_storage::state_machine::{QueryLifecycle, TaskState};
use query_storage::store::TaskProgress;
use query_storage::QueryStorageError;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_update_checkpoint_requires_live_lease() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    let claimed = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();

    let progressed = claimed.task.checkpoint().with_property("cursor", 10_i64);
    let updated = store
        .update_checkpoint(&claimed.lease, progressed.clone())
        .await
        .unwrap();
    assert_eq!(updated.checkpoint(), &progressed);
    assert_eq!(store.get_task(&task_key).await.unwrap().checkpoint(), &progressed);

    store.force_unlock_task(&task_key).await.unwrap();
    let err = store
        .update_checkpoint(&claimed.lease, progressed.with_property("cursor", 20_i64))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryStorageError::LockNotHeld { .. }));
    assert_eq!(store.get_task(&task_key).await.unwrap().checkpoint(), &progressed);
}

#[tokio::test]
async fn test_update_checkpoint_rejects_foreign_query_key() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    let claimed = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();

    let foreign = Checkpoint::empty(QueryKey::new(Uuid::new_v4(), POOL, QUERY_TYPE));
    let err = store.update_checkpoint(&claimed.lease, foreign).await.unwrap_err();
    assert!(matches!(err, QueryStorageError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_checkpoint_history_follows_successive_holders() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;

    let first = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();
    let after_first = first.task.checkpoint().with_property("cursor", 100_i64);
    store
        .update_checkpoint(&first.lease, after_first.clone())
        .await
        .unwrap();
    let next_key = store
        .advance_task(&first.lease, TaskProgress::MoreData(after_first.clone()))
        .await
        .unwrap()
        .expect("NEXT task spawned");

    assert_eq!(store.get_task_state(&task_key).await.unwrap(), TaskState::Completed);
    assert!(!store.is_task_locked(&task_key).await.unwrap());

    let second = store.claim_task(&next_key, "worker-2", LEASE).await.unwrap();
    assert_eq!(second.task.action(), TaskAction::Next);
    assert_eq!(second.task.checkpoint(), &after_first);
    assert_eq!(second.task.checkpoint().partition(), Some(0));
    assert_eq!(
        second.task.checkpoint().property("cursor"),
        Some(&PropertyValue::Integer(100))
    );
}

#[tokio::test]
async fn test_exhausted_completes_without_follow_on() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    let claimed = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();

    let follow_on = store
        .advance_task(&claimed.lease, TaskProgress::Exhausted)
        .await
        .unwrap();
    assert!(follow_on.is_none());
    assert_eq!(store.get_tasks(task_key.query_id()).await.unwrap().len(), 1);

    let status = store.get_query_status(task_key.query_id()).await.unwrap();
    assert_eq!(status.task_counts.completed, 1);
    assert_eq!(status.task_counts.unfinished(), 0);
    // no automatic close
    assert_eq!(status.lifecycle, QueryLifecycle::Running);
}

#[tokio::test]
async fn test_complete_task_is_idempotent() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    let claimed = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();

    store.complete_task(&claimed.lease).await.unwrap();
    store.complete_task(&claimed.lease).await.unwrap();
    store.fail_task(&claimed.lease, "late failure").await.unwrap();

    assert_eq!(store.get_task_state(&task_key).await.unwrap(), TaskState::Completed);
    let status = store.get_query_status(task_key.query_id()).await.unwrap();
    assert_eq!(status.task_counts.completed, 1);
    assert_eq!(status.lifecycle, QueryLifecycle::Running);
}

#[tokio::test]
async fn test_fail_task_fails_query_and_keeps_other_tasks() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 3).await;
    let claimed = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();

    store.fail_task(&claimed.lease, "shard unreachable").await.unwrap();

    assert_eq!(store.get_task_state(&task_key).await.unwrap(), TaskState::Failed);
    assert!(!store.is_task_locked(&task_key).await.unwrap());
    let status = store.get_query_status(task_key.query_id()).await.unwrap();
    assert_eq!(status.lifecycle, QueryLifecycle::Failed);
    assert_eq!(status.failure_message.as_deref(), Some("shard unreachable"));
    assert_eq!(status.task_counts.failed, 1);
    assert_eq!(status.task_counts.ready, 2);
    assert_eq!(store.get_tasks(task_key.query_id()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_finishing_with_stolen_lease_is_refused() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    let stale = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();
    store.force_unlock_task(&task_key).await.unwrap();
    store.claim_task(&task_key, "worker-2", LEASE).await.unwrap();

    let err = store.complete_task(&stale.lease).await.unwrap_err();
    assert!(matches!(err, QueryStorageError::LockNotHeld { .. }));
    assert_eq!(store.get_task_state(&task_key).await.unwrap(), TaskState::Running);
    assert!(store.is_task_locked(&task_key).await.unwrap());
}

#[tokio::test]
async fn test_release_task_returns_it_to_ready_and_reannounces() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    let claimed = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();
    let mut hints = store.notifier().subscribe(POOL).await.unwrap();

    store.release_task(&claimed.lease).await.unwrap();

    assert_eq!(store.get_task_state(&task_key).await.unwrap(), TaskState::Ready);
    assert!(!store.is_task_locked(&task_key).await.unwrap());
    let hint = tokio::time::timeout(Duration::from_secs(1), hints.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hint.task_key(), task_key);

    store.claim_task(&task_key, "worker-2", LEASE).await.unwrap();
}

#[tokio::test]
async fn test_renew_task_extends_lease() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    let claimed = store
        .claim_task(&task_key, "worker-1", Duration::from_secs(1))
        .await
        .unwrap();

    let renewed = store
        .renew_task(&claimed.lease, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(renewed.handle.token, claimed.lease.handle.token);
    assert!(renewed.handle.expires_at > claimed.lease.handle.expires_at);
}

#[tokio::test]
async fn test_create_task_validates_owner_query() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;

    let orphan = Checkpoint::empty(QueryKey::new(Uuid::new_v4(), POOL, QUERY_TYPE));
    let err = store.create_task(TaskAction::Next, orphan).await.unwrap_err();
    assert!(err.is_not_found());

    let mismatched = Checkpoint::empty(QueryKey::new(task_key.query_id(), "other", QUERY_TYPE));
    let err = store.create_task(TaskAction::Next, mismatched).await.unwrap_err();
    assert!(matches!(err, QueryStorageError::InvalidArgument(_)));

    let checkpoint = store.get_task(&task_key).await.unwrap().checkpoint().clone();
    let task = store.create_task(TaskAction::Close, checkpoint).await.unwrap();
    assert_eq!(store.get_task_state(&task.task_key()).await.unwrap(), TaskState::Ready);
    assert_eq!(
        store.get_query_status(task_key.query_id()).await.unwrap().task_counts.ready,
        2
    );
}

#[tokio::test]
async fn test_delete_task_removes_record_and_lease() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 2).await;
    store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();

    assert!(store.delete_task(&task_key).await.unwrap());
    assert!(!store.is_task_locked(&task_key).await.unwrap());
    assert!(store.get_task(&task_key).await.unwrap_err().is_not_found());
    assert_eq!(store.get_tasks(task_key.query_id()).await.unwrap().len(), 1);
    assert_eq!(
        store.get_query_status(task_key.query_id()).await.unwrap().task_counts.running,
        0
    );

    assert!(!store.delete_task(&task_key).await.unwrap());
}

#[tokio::test]
async fn test_query_counters() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    let query_id = task_key.query_id();

    assert_eq!(store.increment_results_generated(query_id, 25).await.unwrap(), 25);
    assert_eq!(store.increment_results_generated(query_id, 5).await.unwrap(), 30);
    assert_eq!(store.adjust_active_next_calls(query_id, 2).await.unwrap(), 2);
    assert_eq!(store.adjust_active_next_calls(query_id, -5).await.unwrap(), 0);

    let closed = store
        .update_query_lifecycle(query_id, QueryLifecycle::Closed)
        .await
        .unwrap();
    assert_eq!(closed.lifecycle, QueryLifecycle::Closed);
    let err = store
        .update_query_lifecycle(query_id, QueryLifecycle::Running)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryStorageError::StateTransition(_)));
}

#[tokio::test]
async fn test_non_finite_checkpoint_values_are_refused() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    let claimed = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();
    let progressed = claimed.task.checkpoint().with_property("score", 0.5);
    store
        .update_checkpoint(&claimed.lease, progressed.clone())
        .await
        .unwrap();

    let err = store
        .update_checkpoint(&claimed.lease, progressed.with_property("score", f64::NAN))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryStorageError::InvalidArgument(_)));

    let err = store
        .advance_task(
            &claimed.lease,
            TaskProgress::MoreData(progressed.with_property("score", f64::INFINITY)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QueryStorageError::InvalidArgument(_)));

    // the stored record stays readable and the task stays with its holder
    assert_eq!(store.get_task(&task_key).await.unwrap().checkpoint(), &progressed);
    assert_eq!(store.get_task_state(&task_key).await.unwrap(), TaskState::Running);
    assert_eq!(store.get_tasks(task_key.query_id()).await.unwrap().len(), 1);
    store.complete_task(&claimed.lease).await.unwrap();
}
