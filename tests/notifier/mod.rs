//! Ready-task notifications: wire format, best-effort delivery, listeners

use crate::common::*;
use async_trait::async_trait;
use futures::StreamExt;
use query_storage::messaging::{
    InMemoryMessageBus, MessageBus, MessageStream, MessagingError, MessagingResult,
};
use query_storage::priority::FifoPolicy;
use query_storage::store::TaskStore;
use query_storage::worker::NotificationListener;
use std::sync::Arc;
use std::time::Duration;

/// A bus whose every operation fails
#[derive(Debug)]
struct BrokenBus;

#[async_trait]
impl MessageBus for BrokenBus {
    async fn publish(&self, topic: &str, _payload: Vec<u8>) -> MessagingResult<usize> {
        Err(MessagingError::publish(topic, "broker unreachable"))
    }

    async fn subscribe(&self, topic: &str) -> MessagingResult<MessageStream> {
        Err(MessagingError::subscription(topic, "broker unreachable"))
    }

    fn provider_name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn test_wire_format_on_pool_topic() {
    let bus = Arc::new(InMemoryMessageBus::new());
    let store = TaskStore::builder(test_config())
        .message_bus(Arc::clone(&bus) as Arc<dyn MessageBus>)
        .build()
        .unwrap();
    let mut raw = bus.subscribe("query-tasks.default").await.unwrap();

    let task_key = create_event_query(&store, POOL, 1).await;

    let payload = tokio::time::timeout(Duration::from_secs(1), raw.next())
        .await
        .unwrap()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(json["queryId"], task_key.query_id().to_string());
    assert_eq!(json["queryPool"], POOL);
    assert_eq!(json["queryType"], QUERY_TYPE);
    assert_eq!(json["taskId"], task_key.task_id.to_string());
    assert_eq!(bus.published_count(), 1);
}

#[tokio::test]
async fn test_unavailable_bus_does_not_block_work() {
    let store = TaskStore::builder(test_config())
        .message_bus(Arc::new(BrokenBus) as Arc<dyn MessageBus>)
        .build()
        .unwrap();

    let task_key = create_event_query(&store, POOL, 1).await;

    // polling still finds the task
    let work = store
        .get_query(&FifoPolicy, POOL, "worker-1", LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(work.task_key(), &task_key);
}

#[tokio::test]
async fn test_disabled_notifications() {
    let mut config = test_config();
    config.notifications.enabled = false;
    let store = Arc::new(TaskStore::in_memory(config).unwrap());

    assert!(!store.notifier().is_enabled());
    let err = NotificationListener::subscribe(Arc::clone(&store), POOL, "worker-1", LEASE)
        .await
        .unwrap_err();
    assert!(matches!(err, query_storage::QueryStorageError::Messaging(_)));

    create_event_query(&store, POOL, 1).await;
    assert_eq!(store.ready_candidates(POOL).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_competing_listeners_claim_each_task_once() {
    let store = new_store();
    let mut listeners = Vec::new();
    for worker in 0..3 {
        listeners.push(
            NotificationListener::subscribe(Arc::clone(&store), POOL, format!("worker-{worker}"), LEASE)
                .await
                .unwrap(),
        );
    }

    let first = create_event_query(&store, POOL, 2).await;
    // duplicate hints for every task
    for task_key in store.get_tasks(first.query_id()).await.unwrap() {
        store
            .notifier()
            .announce(&(&task_key).into())
            .await
            .unwrap();
    }

    // each listener sees four hints: two originals and two duplicates
    let mut claims = Vec::new();
    for listener in &mut listeners {
        for _ in 0..4 {
            let hint = tokio::time::timeout(Duration::from_secs(1), listener.next_notification())
                .await
                .unwrap()
                .unwrap();
            if let Some(claimed) = listener.try_claim(&hint).await.unwrap() {
                claims.push(claimed.task_key().clone());
            }
        }
    }

    claims.sort();
    claims.dedup();
    assert_eq!(claims.len(), 2);
    assert_eq!(
        store.get_query_status(first.query_id()).await.unwrap().task_counts.running,
        2
    );
}
