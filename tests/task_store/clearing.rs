use crate::common::*;
use query_storage::locking::{InMemoryLockManager, LockManager};
use query_storage::priority::FifoPolicy;
use query_storage::store::TaskStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_clear_removes_everything_and_is_idempotent() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 3).await;
    let query_id = task_key.query_id();
    store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();

    // three tasks, the task states and the status
    assert_eq!(store.clear(query_id).await.unwrap(), 5);

    assert!(store.get_query_status(query_id).await.unwrap_err().is_not_found());
    assert!(store.get_task(&task_key).await.unwrap_err().is_not_found());
    assert!(store.get_tasks(query_id).await.unwrap().is_empty());
    assert!(!store.is_task_locked(&task_key).await.unwrap());

    assert_eq!(store.clear(query_id).await.unwrap(), 0);
    assert_eq!(store.clear(Uuid::new_v4()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_clear_leaves_other_queries_alone() {
    let store = new_store();
    let doomed = create_event_query(&store, POOL, 2).await;
    let kept = create_event_query(&store, POOL, 2).await;

    store.clear(doomed.query_id()).await.unwrap();

    assert_eq!(store.get_tasks(kept.query_id()).await.unwrap().len(), 2);
    let work = store
        .get_query(&FifoPolicy, POOL, "worker-1", LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(work.task_key().query_id(), kept.query_id());
}

#[tokio::test]
async fn test_clear_all_empties_the_store() {
    let store = new_store();
    let first = create_event_query(&store, POOL, 2).await;
    create_event_query(&store, "batch", 1).await;
    store.claim_task(&first, "worker-1", LEASE).await.unwrap();

    assert_eq!(store.clear_all().await.unwrap(), 7);
    assert!(store.get_query_statuses().await.unwrap().is_empty());
    assert!(store.get_tasks_for_pool(POOL).await.unwrap().is_empty());
    assert!(!store.is_task_locked(&first).await.unwrap());

    assert_eq!(store.clear_all().await.unwrap(), 0);
}

#[tokio::test]
async fn test_clear_purges_lapsed_leases_of_abandoned_tasks() {
    let locks = Arc::new(InMemoryLockManager::new());
    let store = TaskStore::builder(test_config())
        .lock_manager(Arc::clone(&locks) as Arc<dyn LockManager>)
        .build()
        .unwrap();
    let abandoned = create_event_query(&store, POOL, 1).await;
    let finished = create_event_query(&store, POOL, 1).await;

    // holder crashes; nobody reclaims the task
    store
        .claim_task(&abandoned, "worker-1", Duration::from_millis(20))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    store.clear(finished.query_id()).await.unwrap();

    assert_eq!(locks.purge_expired().await.unwrap(), 0);
    assert!(!store.is_task_locked(&abandoned).await.unwrap());
    assert_eq!(
        store.get_query_status(abandoned.query_id()).await.unwrap().task_counts.running,
        1
    );
}
