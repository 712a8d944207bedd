//! # Task Store
//!
//! Persistence and decomposition engine for queries and their tasks, built on
//! a [`StorageBackend`], a [`LockManager`] and a [`TaskNotifier`].
//!
//! ## Persisted layout
//!
//! ```text
//! QUERY:<queryId>                 QueryStatus
//! TASKS:<queryId>                 TaskStates
//! TASK:<taskId:queryId:queryType> QueryTask
//! ```
//!
//! ## Concurrency
//!
//! - A task is executed by whoever holds the lease on its `TASK:` key.
//! - `QueryStatus`/`TaskStates` read-modify-write runs under a short internal
//!   lease on `TASKS:<queryId>`, so concurrent claims and completions never
//!   lose an update.
//! - Tasks are durable before they are announced.

mod queries;
mod selection;
mod tasks;

use crate::config::QueryStorageConfig;
use crate::error::{QueryStorageError, Result};
use crate::locking::{task_lock_key, InMemoryLockManager, LockHandle, LockManager, TaskLease};
use crate::messaging::{InMemoryMessageBus, MessageBus, TaskNotifier};
use crate::models::{
    keys, Checkpoint, QueryState, QueryStatus, QueryTask, QueryTaskNotification, TaskKey,
    TaskStates,
};
use crate::registry::ExecutorRegistry;
use crate::storage::{self, InMemoryBackend, StorageBackend};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A task together with the lease that entitles the caller to execute it
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedTask {
    pub task: QueryTask,
    pub lease: TaskLease,
}

impl ClaimedTask {
    pub fn task_key(&self) -> &TaskKey {
        &self.lease.task_key
    }
}

/// Result of `get_query`: the claimed task and a view of its query
#[derive(Debug, Clone, PartialEq)]
pub struct WorkAssignment {
    pub query_state: QueryState,
    pub task: QueryTask,
    pub lease: TaskLease,
}

impl WorkAssignment {
    pub fn task_key(&self) -> &TaskKey {
        &self.lease.task_key
    }

    pub fn into_claimed(self) -> ClaimedTask {
        ClaimedTask {
            task: self.task,
            lease: self.lease,
        }
    }
}

/// How a worker finished executing a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "checkpoint")]
pub enum TaskProgress {
    /// More data remains: continue the partition from this checkpoint
    MoreData(Checkpoint),
    /// The partition is exhausted
    Exhausted,
    /// Schedule a CLOSE task from this checkpoint
    Close(Checkpoint),
}

pub struct TaskStore {
    backend: Arc<dyn StorageBackend>,
    locks: Arc<dyn LockManager>,
    notifier: TaskNotifier,
    registry: Arc<ExecutorRegistry>,
    config: Arc<QueryStorageConfig>,
    instance_id: String,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("backend", &self.backend.backend_name())
            .field("locks", &self.locks.provider_name())
            .field("notifications", &self.notifier.is_enabled())
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

impl TaskStore {
    pub fn new(
        config: Arc<QueryStorageConfig>,
        backend: Arc<dyn StorageBackend>,
        locks: Arc<dyn LockManager>,
        notifier: TaskNotifier,
        registry: Arc<ExecutorRegistry>,
    ) -> Self {
        Self {
            backend,
            locks,
            notifier,
            registry,
            config,
            instance_id: format!("store-{}", Uuid::new_v4()),
        }
    }

    pub fn builder(config: QueryStorageConfig) -> TaskStoreBuilder {
        TaskStoreBuilder::new(config)
    }

    /// A store with in-memory storage, locks and bus
    pub fn in_memory(config: QueryStorageConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &QueryStorageConfig {
        &self.config
    }

    pub fn lock_manager(&self) -> Arc<dyn LockManager> {
        Arc::clone(&self.locks)
    }

    pub fn notifier(&self) -> &TaskNotifier {
        &self.notifier
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Whether a live lease exists on the task
    pub async fn is_task_locked(&self, task_key: &TaskKey) -> Result<bool> {
        self.locks.is_locked(&task_lock_key(task_key)).await
    }

    /// Drop any lease on the task regardless of holder
    pub async fn force_unlock_task(&self, task_key: &TaskKey) -> Result<bool> {
        let released = self.locks.force_unlock(&task_lock_key(task_key)).await?;
        if released {
            warn!(task_key = %task_key, "Task lease force-released");
        }
        Ok(released)
    }

    // ---- internal per-query lease ----

    async fn acquire_query_lock(&self, query_id: Uuid) -> Result<LockHandle> {
        let lock = &self.config.lock;
        let holder = format!("{}#{}", self.instance_id, Uuid::new_v4());
        self.locks
            .lock_with_wait(
                &keys::states_storage_key(query_id),
                &holder,
                lock.internal_lock_lease(),
                lock.internal_lock_wait(),
                lock.retry_interval(),
            )
            .await
    }

    async fn release_query_lock(&self, handle: &LockHandle) {
        self.release_quietly(handle).await;
    }

    async fn release_quietly(&self, handle: &LockHandle) {
        match self.locks.release(handle).await {
            Ok(true) => {}
            Ok(false) => debug!(lock_key = %handle.lock_key, "Lease had already lapsed on release"),
            Err(e) => warn!(lock_key = %handle.lock_key, error = %e, "Failed to release lease"),
        }
    }

    // ---- record access ----

    async fn load<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key).await? {
            Some(bytes) => Ok(Some(storage::decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn save<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = storage::encode(value)?;
        self.backend.put(key, bytes).await
    }

    async fn load_status(&self, query_id: Uuid) -> Result<Option<QueryStatus>> {
        self.load(&keys::status_storage_key(query_id)).await
    }

    async fn require_status(&self, query_id: Uuid) -> Result<QueryStatus> {
        self.load_status(query_id)
            .await?
            .ok_or_else(|| QueryStorageError::not_found("query", query_id))
    }

    async fn save_status(&self, status: &QueryStatus) -> Result<()> {
        self.save(&status.query_key.status_storage_key(), status).await
    }

    async fn load_states(&self, query_id: Uuid) -> Result<Option<TaskStates>> {
        self.load(&keys::states_storage_key(query_id)).await
    }

    async fn save_states(&self, states: &TaskStates) -> Result<()> {
        self.save(&states.query_key().states_storage_key(), states).await
    }

    /// The storage key omits the pool, so a key naming another pool must not
    /// resolve to this task
    async fn load_task(&self, task_key: &TaskKey) -> Result<Option<QueryTask>> {
        let task: Option<QueryTask> = self.load(&task_key.storage_key()).await?;
        Ok(task.filter(|task| task.checkpoint().query_key() == &task_key.query_key))
    }

    async fn save_task(&self, task: &QueryTask) -> Result<()> {
        task.checkpoint().validate()?;
        self.save(&task.task_key().storage_key(), task).await
    }

    /// Copy the rollup counts of `states` into the status record
    async fn sync_status_counts(&self, states: &TaskStates) -> Result<QueryStatus> {
        let mut status = self.require_status(states.query_key().query_id).await?;
        status.task_counts = states.counts();
        status.touch();
        self.save_status(&status).await?;
        Ok(status)
    }

    /// Best-effort "task ready" hint
    async fn announce(&self, task_key: &TaskKey) {
        let notification = QueryTaskNotification::from(task_key);
        if let Err(e) = self.notifier.announce(&notification).await {
            warn!(task_key = %task_key, error = %e, "Failed to announce ready task; workers will find it by polling");
        }
    }
}

/// Assembles a [`TaskStore`], defaulting every collaborator to its
/// in-memory implementation
pub struct TaskStoreBuilder {
    config: QueryStorageConfig,
    backend: Option<Arc<dyn StorageBackend>>,
    locks: Option<Arc<dyn LockManager>>,
    bus: Option<Arc<dyn MessageBus>>,
    registry: Option<ExecutorRegistry>,
}

impl TaskStoreBuilder {
    pub fn new(config: QueryStorageConfig) -> Self {
        Self {
            config,
            backend: None,
            locks: None,
            bus: None,
            registry: None,
        }
    }

    pub fn backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn lock_manager(mut self, locks: Arc<dyn LockManager>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn message_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Use `registry` instead of building one from `executors` config
    pub fn registry(mut self, registry: ExecutorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<TaskStore> {
        self.config.validate()?;
        let registry = match self.registry {
            Some(registry) => registry,
            None => ExecutorRegistry::from_config(&self.config.executors)?,
        };
        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(InMemoryMessageBus::new()) as Arc<dyn MessageBus>);
        let notifier = TaskNotifier::new(bus, &self.config.notifications);

        Ok(TaskStore::new(
            Arc::new(self.config),
            self.backend
                .unwrap_or_else(|| Arc::new(InMemoryBackend::new()) as Arc<dyn StorageBackend>),
            self.locks
                .unwrap_or_else(|| Arc::new(InMemoryLockManager::new()) as Arc<dyn LockManager>),
            notifier,
            Arc::new(registry),
        ))
    }
}
