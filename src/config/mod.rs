//! # Query Storage Configuration
//!
//! An explicit configuration object handed to the task store; nothing reads
//! global state at call time. Values come from defaults, optional TOML files
//! and `QUERY_STORAGE__*` environment overrides, merged by [`ConfigManager`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use query_storage::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let lease = manager.config().lock.default_lease();
//! let max_running = manager.config().tasks.max_running_per_query;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::system;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QueryStorageConfig {
    pub lock: LockConfig,
    pub tasks: TaskConfig,
    pub notifications: NotificationConfig,
    pub priority: PriorityConfig,
    pub executors: ExecutorsConfig,
}

/// Lease durations for task locks and the internal per-query lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub default_lease_ms: u64,
    pub internal_lock_lease_ms: u64,
    pub internal_lock_wait_ms: u64,
    pub retry_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_lease_ms: system::DEFAULT_LEASE_MS,
            internal_lock_lease_ms: system::INTERNAL_LOCK_LEASE_MS,
            internal_lock_wait_ms: system::INTERNAL_LOCK_WAIT_MS,
            retry_interval_ms: system::LOCK_RETRY_INTERVAL_MS,
            heartbeat_interval_ms: system::HEARTBEAT_INTERVAL_MS,
        }
    }
}

impl LockConfig {
    pub fn default_lease(&self) -> Duration {
        Duration::from_millis(self.default_lease_ms)
    }

    pub fn internal_lock_lease(&self) -> Duration {
        Duration::from_millis(self.internal_lock_lease_ms)
    }

    pub fn internal_lock_wait(&self) -> Duration {
        Duration::from_millis(self.internal_lock_wait_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub max_running_per_query: usize,
    pub default_initial_tasks: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_running_per_query: system::DEFAULT_MAX_RUNNING_PER_QUERY,
            default_initial_tasks: system::DEFAULT_INITIAL_TASKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub topic_prefix: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topic_prefix: system::DEFAULT_TOPIC_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriorityPolicyKind {
    #[default]
    Fifo,
    HighestFirst,
    RoundRobin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolWeight {
    pub pool: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PriorityConfig {
    pub policy: PriorityPolicyKind,
    pub pool_weights: Vec<PoolWeight>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorRegistration {
    pub query_type: String,
    pub decomposer: String,
}

/// `query_type -> decomposer` registrations resolved at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorsConfig {
    /// Used for query types without a registration; `None` rejects them
    pub default_decomposer: Option<String>,
    pub types: Vec<ExecutorRegistration>,
}

impl Default for ExecutorsConfig {
    fn default() -> Self {
        Self {
            default_decomposer: Some("slot".to_string()),
            types: Vec::new(),
        }
    }
}

impl QueryStorageConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let lock = &self.lock;
        for (field, value) in [
            ("lock.default_lease_ms", lock.default_lease_ms),
            ("lock.internal_lock_lease_ms", lock.internal_lock_lease_ms),
            ("lock.retry_interval_ms", lock.retry_interval_ms),
            ("lock.heartbeat_interval_ms", lock.heartbeat_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(field, value, "must be greater than zero"));
            }
        }
        if lock.internal_lock_wait_ms < lock.retry_interval_ms {
            return Err(ConfigurationError::invalid_value(
                "lock.internal_lock_wait_ms",
                lock.internal_lock_wait_ms,
                "must be at least lock.retry_interval_ms",
            ));
        }
        if lock.heartbeat_interval_ms >= lock.default_lease_ms {
            return Err(ConfigurationError::invalid_value(
                "lock.heartbeat_interval_ms",
                lock.heartbeat_interval_ms,
                "must be shorter than lock.default_lease_ms",
            ));
        }

        if self.tasks.max_running_per_query == 0 {
            return Err(ConfigurationError::invalid_value(
                "tasks.max_running_per_query",
                0,
                "must be at least 1",
            ));
        }
        if self.tasks.default_initial_tasks == 0 {
            return Err(ConfigurationError::invalid_value(
                "tasks.default_initial_tasks",
                0,
                "must be at least 1",
            ));
        }

        if self.notifications.enabled && self.notifications.topic_prefix.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "topic_prefix",
                "notifications",
            ));
        }

        let mut pools = HashSet::new();
        for entry in &self.priority.pool_weights {
            if entry.weight == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("priority.pool_weights[{}].weight", entry.pool),
                    entry.weight,
                    "must be at least 1",
                ));
            }
            if !pools.insert(entry.pool.as_str()) {
                return Err(ConfigurationError::DuplicateEntry {
                    kind: "pool weight".to_string(),
                    key: entry.pool.clone(),
                });
            }
        }

        let mut query_types = HashSet::new();
        for registration in &self.executors.types {
            if registration.query_type.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "query_type",
                    "executors.types",
                ));
            }
            if !query_types.insert(registration.query_type.as_str()) {
                return Err(ConfigurationError::DuplicateEntry {
                    kind: "executor".to_string(),
                    key: registration.query_type.clone(),
                });
            }
        }

        Ok(())
    }

    /// Weight of `pool` for the highest-first policy; unlisted pools weigh 1
    pub fn pool_weight(&self, pool: &str) -> u32 {
        self.priority
            .pool_weights
            .iter()
            .find(|entry| entry.pool == pool)
            .map(|entry| entry.weight)
            .unwrap_or(1)
    }
}
