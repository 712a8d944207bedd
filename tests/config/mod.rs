//! Configuration files driving a real store

use crate::common::*;
use query_storage::config::{ConfigManager, PriorityPolicyKind};
use query_storage::models::QueryDefinition;
use query_storage::priority::build_policy;
use query_storage::store::TaskStore;
use query_storage::QueryStorageError;
use std::fs;
use tempfile::TempDir;

const BASE_TOML: &str = r#"
[lock]
default_lease_ms = 60000
heartbeat_interval_ms = 15000

[tasks]
max_running_per_query = 4

[priority]
policy = "highest_first"
pool_weights = [
  { pool = "interactive", weight = 10 },
  { pool = "batch", weight = 1 },
]

[executors]
default_decomposer = "slot"

[[executors.types]]
query_type = "RangeQuery"
decomposer = "range"
"#;

fn write_config(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

#[test]
fn test_full_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "query-storage.toml", BASE_TOML);

    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap();
    let config = manager.config();

    assert_eq!(config.lock.default_lease_ms, 60_000);
    assert_eq!(config.tasks.max_running_per_query, 4);
    assert_eq!(config.priority.policy, PriorityPolicyKind::HighestFirst);
    assert_eq!(config.pool_weight("interactive"), 10);
    assert_eq!(config.executors.types.len(), 1);
    assert_eq!(build_policy(&config.priority).name(), "highest_first");
}

#[tokio::test]
async fn test_store_uses_configured_executors() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "query-storage.toml", BASE_TOML);
    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap();

    let store = TaskStore::in_memory(manager.config().clone()).unwrap();
    assert!(store.registry().is_registered("RangeQuery"));

    let definition = QueryDefinition::new("RangeQuery", "ts in range")
        .with_parameter("rangeStart", "0")
        .with_parameter("rangeEnd", "2");
    let err = store
        .create_query(POOL, definition, authorizations(), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryStorageError::InvalidArgument(_)));

    // unregistered types fall back to slots
    create_event_query(&store, POOL, 2).await;
}

#[test]
fn test_unknown_decomposer_fails_store_build() {
    let mut config = test_config();
    config.executors.default_decomposer = Some("hash".to_string());

    let err = TaskStore::in_memory(config).unwrap_err();
    assert!(matches!(err, QueryStorageError::Configuration(_)));
}
