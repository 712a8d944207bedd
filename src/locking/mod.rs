//! # Leased Exclusive Locks
//!
//! Cluster-wide exclusive locks keyed by string. A lock is held through a
//! lease that expires on its own; a crashed holder simply stops renewing and
//! the key becomes lockable again. At most one live lease exists per key,
//! even when holders race.
//!
//! Task locks use the task storage key (`TASK:<taskId:queryId:queryType>`) as
//! the lock key. The task store additionally takes short internal leases on
//! `TASKS:<queryId>` to serialize read-modify-write of per-query records.

pub mod in_memory;

pub use in_memory::{InMemoryLockManager, LockStats};

use crate::error::{QueryStorageError, Result};
use crate::models::TaskKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Proof of a lease. The `token` identifies this acquisition; a later holder
/// of the same key always gets a different token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHandle {
    pub lock_key: String,
    pub holder_id: String,
    pub token: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockHandle {
    /// Local view only; the lock manager is authoritative
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// A lease on one task, as handed to workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLease {
    pub task_key: TaskKey,
    pub handle: LockHandle,
}

impl TaskLease {
    pub fn new(task_key: TaskKey, handle: LockHandle) -> Self {
        Self { task_key, handle }
    }

    pub fn holder_id(&self) -> &str {
        &self.handle.holder_id
    }

    /// Same task, refreshed handle (after a renewal)
    pub fn with_handle(&self, handle: LockHandle) -> Self {
        Self::new(self.task_key.clone(), handle)
    }
}

pub fn task_lock_key(task_key: &TaskKey) -> String {
    task_key.storage_key()
}

#[async_trait]
pub trait LockManager: Send + Sync + Debug + 'static {
    /// Acquire `lock_key` for `lease`. Fails with `TaskLock` while another
    /// holder has a live lease. Re-locking by the current holder extends
    /// the lease and keeps its token.
    async fn try_lock(&self, lock_key: &str, holder_id: &str, lease: Duration) -> Result<LockHandle>;

    /// Extend a live lease. Fails with `TaskLock` if it expired or was taken over.
    async fn renew(&self, handle: &LockHandle, lease: Duration) -> Result<LockHandle>;

    /// Voluntary early release. Returns whether the lease was still held.
    async fn release(&self, handle: &LockHandle) -> Result<bool>;

    /// Whether `handle` is still the live lease of its key
    async fn is_held(&self, handle: &LockHandle) -> Result<bool>;

    /// The live lease on `lock_key`, if any
    async fn current_lease(&self, lock_key: &str) -> Result<Option<LockHandle>>;

    /// Drop any lease on `lock_key` regardless of holder. Administrative.
    async fn force_unlock(&self, lock_key: &str) -> Result<bool>;

    /// Drop every lapsed lease record. Returns the number removed.
    async fn purge_expired(&self) -> Result<usize>;

    fn provider_name(&self) -> &'static str;

    async fn is_locked(&self, lock_key: &str) -> Result<bool> {
        Ok(self.current_lease(lock_key).await?.is_some())
    }

    /// Poll `try_lock` every `retry_interval` until acquired or `wait` elapses
    async fn lock_with_wait(
        &self,
        lock_key: &str,
        holder_id: &str,
        lease: Duration,
        wait: Duration,
        retry_interval: Duration,
    ) -> Result<LockHandle> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match self.try_lock(lock_key, holder_id, lease).await {
                Ok(handle) => return Ok(handle),
                Err(e) if e.is_lock_contention() => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        debug!(lock_key = %lock_key, wait_ms = wait.as_millis() as u64, "Gave up waiting for lock");
                        return Err(QueryStorageError::task_lock(
                            lock_key,
                            format!("not acquired within {}ms", wait.as_millis()),
                        ));
                    }
                    let pause = retry_interval.min(deadline - now);
                    tokio::time::sleep(pause).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
