//! Read-only admin API over a live store

use crate::common::*;
use query_storage::services::{QueryStorageStateService, TaskStoreStateService};
use query_storage::state_machine::QueryLifecycle;
use query_storage::store::TaskProgress;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_running_queries_by_type_and_pool() {
    let store = new_store();
    let service = TaskStoreStateService::new(Arc::clone(&store));
    let interactive = create_event_query(&store, "interactive", 2).await;
    create_event_query(&store, "batch", 1).await;

    assert_eq!(service.get_running_queries().await.unwrap().len(), 2);
    assert_eq!(
        service.get_running_queries_by_type(QUERY_TYPE).await.unwrap().len(),
        2
    );
    let by_pool = service.get_running_queries_by_pool("interactive").await.unwrap();
    assert_eq!(by_pool.len(), 1);
    assert_eq!(by_pool[0].query_id, interactive.query_id());
    assert_eq!(by_pool[0].task_counts.create, 2);
}

#[tokio::test]
async fn test_finished_queries_drop_out_of_running_list() {
    let store = new_store();
    let service = TaskStoreStateService::new(Arc::clone(&store));
    let task_key = create_event_query(&store, POOL, 1).await;

    let claimed = store.claim_task(&task_key, "worker-1", LEASE).await.unwrap();
    store
        .advance_task(&claimed.lease, TaskProgress::Exhausted)
        .await
        .unwrap();
    // lifecycle still open: still listed
    assert_eq!(service.get_running_queries().await.unwrap().len(), 1);

    store
        .update_query_lifecycle(task_key.query_id(), QueryLifecycle::Closed)
        .await
        .unwrap();
    assert!(service.get_running_queries().await.unwrap().is_empty());

    let state = service.get_query(task_key.query_id()).await.unwrap();
    assert_eq!(state.lifecycle, QueryLifecycle::Closed);
    assert_eq!(state.task_states.completed, 1);
}

#[tokio::test]
async fn test_task_descriptions_expose_parameters() {
    let store = new_store();
    let service = TaskStoreStateService::new(Arc::clone(&store));
    let task_key = create_event_query(&store, POOL, 2).await;

    let tasks = service.get_tasks(task_key.query_id()).await.unwrap();
    assert_eq!(tasks.len(), 2);
    for description in &tasks {
        assert_eq!(description.task_key.query_id(), task_key.query_id());
        assert_eq!(description.parameters.get("query").map(String::as_str), Some("A == 'b'"));
        assert_eq!(description.parameters.get("begin").map(String::as_str), Some("20240101"));
        assert_eq!(description.parameters.get("queryType").map(String::as_str), Some(QUERY_TYPE));
        assert!(description.parameters.contains_key("PARTITION"));
    }
}

#[tokio::test]
async fn test_admin_reads_do_not_mutate() {
    let store = new_store();
    let service = TaskStoreStateService::new(Arc::clone(&store));
    let task_key = create_event_query(&store, POOL, 1).await;
    let before = store.get_query_status(task_key.query_id()).await.unwrap();

    service.get_running_queries().await.unwrap();
    service.get_query(task_key.query_id()).await.unwrap();
    service.get_tasks(task_key.query_id()).await.unwrap();

    assert_eq!(store.get_query_status(task_key.query_id()).await.unwrap(), before);
    assert!(service.get_tasks(Uuid::new_v4()).await.unwrap_err().is_not_found());
}
