//! Shared fixtures for integration tests

use query_storage::config::QueryStorageConfig;
use query_storage::models::{QueryDefinition, TaskKey};
use query_storage::store::TaskStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

pub const POOL: &str = "default";
pub const QUERY_TYPE: &str = "EventQuery";
pub const LEASE: Duration = Duration::from_secs(30);

/// Defaults with fast internal locking so tests never wait long
pub fn test_config() -> QueryStorageConfig {
    let mut config = QueryStorageConfig::default();
    config.lock.default_lease_ms = 1_000;
    config.lock.heartbeat_interval_ms = 200;
    config.lock.internal_lock_lease_ms = 500;
    config.lock.internal_lock_wait_ms = 2_000;
    config.lock.retry_interval_ms = 2;
    config
}

pub fn new_store() -> Arc<TaskStore> {
    Arc::new(TaskStore::in_memory(test_config()).expect("test config is valid"))
}

pub fn new_store_with_max_running(max_running: usize) -> Arc<TaskStore> {
    let mut config = test_config();
    config.tasks.max_running_per_query = max_running;
    Arc::new(TaskStore::in_memory(config).expect("test config is valid"))
}

pub fn authorizations() -> BTreeSet<String> {
    BTreeSet::from(["U".to_string(), "FOUO".to_string()])
}

pub fn event_query() -> QueryDefinition {
    QueryDefinition::new(QUERY_TYPE, "A == 'b'")
        .with_parameter("begin", "20240101")
        .with_parameter("end", "20240131")
}

/// Create an `EventQuery` in `pool` with `partitions` CREATE tasks
pub async fn create_event_query(store: &TaskStore, pool: &str, partitions: usize) -> TaskKey {
    store
        .create_query(pool, event_query(), authorizations(), partitions)
        .await
        .expect("query creation succeeds")
}
