use crate::common::*;
use query_storage::models::{QueryKey, TaskKey};
use query_storage::priority::FifoPolicy;
use query_storage::state_machine::{QueryLifecycle, TaskState};
use query_storage::storage::{InMemoryBackend, StorageBackend};
use query_storage::store::{TaskProgress, TaskStore};
use query_storage::QueryStorageError;
use std::sync::Arc;
use tokio_test::assert_ok;
use uuid::Uuid;

#[tokio::test]
async fn test_claim_moves_task_to_running() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;

    let claimed = assert_ok!(store.claim_task(&task_key, "worker-1", LEASE).await);
    assert_eq!(claimed.task_key(), &task_key);
    assert_eq!(claimed.lease.holder_id(), "worker-1");
    assert_eq!(store.get_task_state(&task_key).await.unwrap(), TaskState::Running);
    assert!(store.is_task_locked(&task_key).await.unwrap());

    let status = store.get_query_status(task_key.query_id()).await.unwrap();
    assert_eq!(status.task_counts.running, 1);
    assert_eq!(status.task_counts.ready, 0);
}

#[tokio::test]
async fn test_second_holder_is_refused() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();

    let err = store.claim_task(&task_key, "worker-2", LEASE).await.unwrap_err();
    assert!(err.is_lock_contention());
}

#[tokio::test]
async fn test_same_holder_reclaim_keeps_token() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;

    let first = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();
    let second = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();
    assert_eq!(first.lease.handle.token, second.lease.handle.token);
    assert_eq!(
        store.get_query_status(task_key.query_id()).await.unwrap().task_counts.running,
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;

    let mut handles = Vec::new();
    for worker in 0..16 {
        let store = Arc::clone(&store);
        let task_key = task_key.clone();
        handles.push(tokio::spawn(async move {
            store
                .claim_task(&task_key, &format!("worker-{worker}"), LEASE)
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(e.is_lock_contention(), "unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(
        store.get_query_status(task_key.query_id()).await.unwrap().task_counts.running,
        1
    );
}

#[tokio::test]
async fn test_running_limit_refuses_extra_claims() {
    let store = new_store_with_max_running(1);
    let first = create_event_query(&store, POOL, 2).await;
    let other = store
        .get_tasks(first.query_id())
        .await
        .unwrap()
        .into_iter()
        .find(|key| key != &first)
        .unwrap();

    store.claim_task(&first, "worker-1", LEASE).await.unwrap();
    let err = store.claim_task(&other, "worker-2", LEASE).await.unwrap_err();
    assert!(err.is_lock_contention());

    // the refused claim leaves no lease behind
    assert!(!store.is_task_locked(&other).await.unwrap());
    assert_eq!(store.get_task_state(&other).await.unwrap(), TaskState::Ready);
}

#[tokio::test]
async fn test_finished_task_cannot_be_claimed() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    let claimed = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();
    store.complete_task(&claimed.lease).await.unwrap();

    let err = store.claim_task(&task_key, "worker-2", LEASE).await.unwrap_err();
    assert!(err.is_lock_contention());
    assert!(!store.is_task_locked(&task_key).await.unwrap());
}

#[tokio::test]
async fn test_claiming_unknown_task_is_not_found() {
    let store = new_store();
    let task_key = TaskKey::generate(QueryKey::new(Uuid::new_v4(), POOL, QUERY_TYPE));

    let err = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap_err();
    assert!(matches!(err, QueryStorageError::NotFound { .. }));
    assert!(!store.is_task_locked(&task_key).await.unwrap());
}

#[tokio::test]
async fn test_get_query_claims_from_requested_pool_only() {
    let store = new_store();
    create_event_query(&store, "batch", 1).await;

    assert!(store
        .get_query(&FifoPolicy, POOL, "worker-1", LEASE)
        .await
        .unwrap()
        .is_none());

    let interactive = create_event_query(&store, POOL, 1).await;
    let work = store
        .get_query(&FifoPolicy, POOL, "worker-1", LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(work.task_key(), &interactive);
    assert_eq!(work.query_state.query_id, interactive.query_id());
    assert_eq!(work.query_state.task_states.running, 1);
}

#[tokio::test]
async fn test_get_query_skips_queries_at_running_limit() {
    let store = new_store_with_max_running(1);
    let busy = create_event_query(&store, POOL, 2).await;
    store.claim_task(&busy, "worker-1", LEASE).await.unwrap();

    assert!(store
        .get_query(&FifoPolicy, POOL, "worker-2", LEASE)
        .await
        .unwrap()
        .is_none());

    let idle = create_event_query(&store, POOL, 1).await;
    let work = store
        .get_query(&FifoPolicy, POOL, "worker-2", LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(work.task_key(), &idle);
}

#[tokio::test]
async fn test_canceled_query_offers_only_close_tasks() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 2).await;
    let claimed = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();
    let close_checkpoint = claimed.task.checkpoint().with_property("reason", "done");
    let close_key = store
        .advance_task(&claimed.lease, TaskProgress::Close(close_checkpoint))
        .await
        .unwrap()
        .unwrap();

    store
        .update_query_lifecycle(task_key.query_id(), QueryLifecycle::Canceled)
        .await
        .unwrap();

    let candidates = store.ready_candidates(POOL).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].task_key, close_key);
}

#[tokio::test]
async fn test_key_from_another_pool_does_not_resolve() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;
    let wrong_pool = TaskKey::new(
        task_key.task_id,
        QueryKey::new(task_key.query_id(), "other", QUERY_TYPE),
    );

    assert!(store.get_task(&wrong_pool).await.unwrap_err().is_not_found());
    let err = store.claim_task(&wrong_pool, "worker-1", LEASE).await.unwrap_err();
    assert!(err.is_not_found());

    assert!(!store.is_task_locked(&task_key).await.unwrap());
    assert_eq!(store.get_task_state(&task_key).await.unwrap(), TaskState::Ready);
    store.claim_task(&task_key, "worker-2", LEASE).await.unwrap();
}

#[tokio::test]
async fn test_unreadable_task_does_not_block_its_pool() {
    let backend = Arc::new(InMemoryBackend::new());
    let store = TaskStore::builder(test_config())
        .backend(Arc::clone(&backend) as Arc<dyn StorageBackend>)
        .build()
        .unwrap();
    let damaged = create_event_query(&store, POOL, 1).await;
    backend
        .put(&damaged.storage_key(), b"{not json".to_vec())
        .await
        .unwrap();
    let healthy = create_event_query(&store, POOL, 1).await;

    let work = store
        .get_query(&FifoPolicy, POOL, "worker-1", LEASE)
        .await
        .unwrap()
        .expect("healthy task is claimed");
    assert_eq!(work.task_key(), &healthy);

    // the damaged task is left READY and unleased
    assert!(store
        .get_query(&FifoPolicy, POOL, "worker-2", LEASE)
        .await
        .unwrap()
        .is_none());
    assert!(!store.is_task_locked(&damaged).await.unwrap());
    assert_eq!(store.get_task_state(&damaged).await.unwrap(), TaskState::Ready);
}
