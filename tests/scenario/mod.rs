//! End-to-end worker scenarios

use crate::common::*;
use query_storage::models::TaskAction;
use query_storage::priority::FifoPolicy;
use query_storage::state_machine::QueryLifecycle;
use query_storage::store::TaskProgress;
use query_storage::worker::LeaseKeeper;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_workers_share_three_partitions() {
    let store = new_store();
    let first = create_event_query(&store, POOL, 3).await;
    let query_id = first.query_id();

    let mut handles = Vec::new();
    for worker in 0..3 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .get_query(&FifoPolicy, POOL, &format!("worker-{worker}"), LEASE)
                .await
        }));
    }
    let mut assignments = Vec::new();
    for handle in handles {
        assignments.push(handle.await.unwrap().unwrap().expect("each worker gets a task"));
    }

    let distinct: HashSet<_> = assignments.iter().map(|a| a.task_key().clone()).collect();
    assert_eq!(distinct.len(), 3);

    let fourth = store
        .get_query(&FifoPolicy, POOL, "worker-3", LEASE)
        .await
        .unwrap();
    assert!(fourth.is_none());

    for assignment in &assignments {
        store
            .advance_task(&assignment.lease, TaskProgress::Exhausted)
            .await
            .unwrap();
    }

    let status = store.get_query_status(query_id).await.unwrap();
    assert_eq!(status.task_counts.completed, 3);
    assert_eq!(status.task_counts.unfinished(), 0);
}

#[tokio::test]
async fn test_partition_runs_create_next_close() {
    let store = new_store();
    let create_key = create_event_query(&store, POOL, 1).await;
    let query_id = create_key.query_id();

    // CREATE: first page, more to come
    let work = store
        .get_query(&FifoPolicy, POOL, "worker-1", LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(work.task.action(), TaskAction::Create);
    let keeper = LeaseKeeper::for_task(
        store.lock_manager(),
        &work.lease,
        LEASE,
        store.config().lock.heartbeat_interval(),
    );
    let page_one = work.task.checkpoint().with_property("cursor", 1_i64);
    store.update_checkpoint(&work.lease, page_one.clone()).await.unwrap();
    store.increment_results_generated(query_id, 100).await.unwrap();
    assert!(!keeper.is_lost());
    keeper.stop().await;
    let next_key = store
        .advance_task(&work.lease, TaskProgress::MoreData(page_one))
        .await
        .unwrap()
        .unwrap();

    // NEXT: resumes from the cursor and finishes the partition
    let work = store
        .get_query(&FifoPolicy, POOL, "worker-2", LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(work.task_key(), &next_key);
    assert_eq!(work.task.action(), TaskAction::Next);
    assert_eq!(
        work.task.checkpoint().property("cursor").and_then(|v| v.as_i64()),
        Some(1)
    );
    let close_key = store
        .advance_task(
            &work.lease,
            TaskProgress::Close(work.task.checkpoint().clone()),
        )
        .await
        .unwrap()
        .unwrap();

    // CLOSE runs even after the caller closed the query
    store
        .update_query_lifecycle(query_id, QueryLifecycle::Closed)
        .await
        .unwrap();
    let work = store
        .get_query(&FifoPolicy, POOL, "worker-3", LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(work.task_key(), &close_key);
    assert_eq!(work.task.action(), TaskAction::Close);
    store.complete_task(&work.lease).await.unwrap();

    let state = store.get_query_state(query_id).await.unwrap();
    assert_eq!(state.task_counts.create, 1);
    assert_eq!(state.task_counts.next, 1);
    assert_eq!(state.task_counts.close, 1);
    assert_eq!(state.task_states.completed, 3);
    assert!(!state.is_running());
    assert_eq!(
        store.get_query_status(query_id).await.unwrap().num_results_generated,
        100
    );

    store.clear(query_id).await.unwrap();
    assert!(store
        .get_query(&FifoPolicy, POOL, "worker-4", LEASE)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_crashed_worker_partition_is_finished_by_another() {
    let store = new_store();
    let task_key = create_event_query(&store, POOL, 1).await;

    let crashed = store
        .get_query(&FifoPolicy, POOL, "worker-1", Duration::from_millis(40))
        .await
        .unwrap()
        .unwrap();
    let progress = crashed.task.checkpoint().with_property("cursor", 7_i64);
    store.update_checkpoint(&crashed.lease, progress.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let rescue = store
        .get_query(&FifoPolicy, POOL, "worker-2", LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rescue.task_key(), &task_key);
    assert_eq!(rescue.task.checkpoint(), &progress);
    store.complete_task(&rescue.lease).await.unwrap();

    assert_eq!(
        store.get_query_status(task_key.query_id()).await.unwrap().task_counts.completed,
        1
    );
}
