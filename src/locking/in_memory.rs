//! # In-Memory Lock Manager
//!
//! Single-process lease table on `DashMap`. Acquisition goes through the
//! map's entry API, so the expiry check and the takeover happen under one
//! shard lock and exactly one racer wins.

use super::{LockHandle, LockManager};
use crate::error::{QueryStorageError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct LeaseRecord {
    holder_id: String,
    token: Uuid,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    deadline: Instant,
}

impl LeaseRecord {
    fn fresh(holder_id: &str, lease: Duration) -> Self {
        let now = Utc::now();
        Self {
            holder_id: holder_id.to_string(),
            token: Uuid::new_v4(),
            acquired_at: now,
            expires_at: now + to_chrono(lease),
            deadline: Instant::now() + lease,
        }
    }

    fn extended(&self, lease: Duration) -> Self {
        Self {
            expires_at: Utc::now() + to_chrono(lease),
            deadline: Instant::now() + lease,
            ..self.clone()
        }
    }

    fn is_live(&self) -> bool {
        self.deadline > Instant::now()
    }

    fn handle(&self, lock_key: &str) -> LockHandle {
        LockHandle {
            lock_key: lock_key.to_string(),
            holder_id: self.holder_id.clone(),
            token: self.token,
            acquired_at: self.acquired_at,
            expires_at: self.expires_at,
        }
    }
}

fn to_chrono(lease: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(lease.as_millis()).unwrap_or(i64::MAX / 1_000))
}

/// Counters describing lock traffic
#[derive(Debug, Default)]
pub struct LockStats {
    pub acquired: AtomicU64,
    pub contended: AtomicU64,
    pub expired_takeovers: AtomicU64,
    pub renewed: AtomicU64,
    pub released: AtomicU64,
}

impl LockStats {
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    pub fn expired_takeovers(&self) -> u64 {
        self.expired_takeovers.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLockManager {
    leases: DashMap<String, LeaseRecord>,
    stats: LockStats,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &LockStats {
        &self.stats
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn try_lock(&self, lock_key: &str, holder_id: &str, lease: Duration) -> Result<LockHandle> {
        match self.leases.entry(lock_key.to_string()) {
            Entry::Vacant(vacant) => {
                let record = LeaseRecord::fresh(holder_id, lease);
                let handle = record.handle(lock_key);
                vacant.insert(record);
                self.stats.acquired.fetch_add(1, Ordering::Relaxed);
                trace!(lock_key = %lock_key, holder_id = %holder_id, "Lock acquired");
                Ok(handle)
            }
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().clone();
                if current.is_live() {
                    if current.holder_id == holder_id {
                        let record = current.extended(lease);
                        let handle = record.handle(lock_key);
                        occupied.insert(record);
                        return Ok(handle);
                    }
                    self.stats.contended.fetch_add(1, Ordering::Relaxed);
                    return Err(QueryStorageError::task_lock(
                        lock_key,
                        format!("held by {} until {}", current.holder_id, current.expires_at),
                    ));
                }

                let record = LeaseRecord::fresh(holder_id, lease);
                let handle = record.handle(lock_key);
                occupied.insert(record);
                self.stats.acquired.fetch_add(1, Ordering::Relaxed);
                self.stats.expired_takeovers.fetch_add(1, Ordering::Relaxed);
                debug!(
                    lock_key = %lock_key,
                    holder_id = %holder_id,
                    previous_holder = %current.holder_id,
                    "Lock taken over after lease expiry"
                );
                Ok(handle)
            }
        }
    }

    async fn renew(&self, handle: &LockHandle, lease: Duration) -> Result<LockHandle> {
        if let Some(mut record) = self.leases.get_mut(&handle.lock_key) {
            if record.token == handle.token && record.is_live() {
                *record = record.extended(lease);
                self.stats.renewed.fetch_add(1, Ordering::Relaxed);
                return Ok(record.handle(&handle.lock_key));
            }
        }
        Err(QueryStorageError::task_lock(
            handle.lock_key.as_str(),
            format!("lease of {} expired or was taken over", handle.holder_id),
        ))
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool> {
        let removed = self
            .leases
            .remove_if(&handle.lock_key, |_, record| record.token == handle.token);
        match removed {
            Some((_, record)) => {
                self.stats.released.fetch_add(1, Ordering::Relaxed);
                Ok(record.is_live())
            }
            None => Ok(false),
        }
    }

    async fn is_held(&self, handle: &LockHandle) -> Result<bool> {
        Ok(self
            .leases
            .get(&handle.lock_key)
            .map(|record| record.token == handle.token && record.is_live())
            .unwrap_or(false))
    }

    async fn current_lease(&self, lock_key: &str) -> Result<Option<LockHandle>> {
        Ok(self
            .leases
            .get(lock_key)
            .filter(|record| record.is_live())
            .map(|record| record.handle(lock_key)))
    }

    async fn force_unlock(&self, lock_key: &str) -> Result<bool> {
        Ok(self
            .leases
            .remove(lock_key)
            .map(|(_, record)| record.is_live())
            .unwrap_or(false))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let before = self.leases.len();
        self.leases.retain(|_, record| record.is_live());
        let purged = before.saturating_sub(self.leases.len());
        if purged > 0 {
            trace!(purged = purged, "Purged lapsed leases");
        }
        Ok(purged)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
