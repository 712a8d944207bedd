use crate::locking::{LockHandle, LockManager, TaskLease};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct KeeperState {
    current: Mutex<LockHandle>,
    lost: AtomicBool,
    shutdown_notify: Notify,
}

/// Background heartbeat that renews a lease every `interval` until stopped.
///
/// If a renewal fails (the lease lapsed or was taken over) the keeper stops
/// and [`LeaseKeeper::is_lost`] reports it; the worker should abandon the
/// task.
#[derive(Debug)]
pub struct LeaseKeeper {
    state: Arc<KeeperState>,
    join_handle: JoinHandle<()>,
}

impl LeaseKeeper {
    pub fn spawn(
        locks: Arc<dyn LockManager>,
        handle: LockHandle,
        lease: Duration,
        interval: Duration,
    ) -> Self {
        let state = Arc::new(KeeperState {
            current: Mutex::new(handle),
            lost: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        });
        let join_handle = tokio::spawn(heartbeat_loop(locks, Arc::clone(&state), lease, interval));
        Self { state, join_handle }
    }

    /// Keep a claimed task's lease alive
    pub fn for_task(
        locks: Arc<dyn LockManager>,
        lease: &TaskLease,
        duration: Duration,
        interval: Duration,
    ) -> Self {
        Self::spawn(locks, lease.handle.clone(), duration, interval)
    }

    pub fn is_lost(&self) -> bool {
        self.state.lost.load(Ordering::Acquire)
    }

    /// The most recently renewed handle
    pub fn current(&self) -> LockHandle {
        self.state.current.lock().clone()
    }

    /// Stop renewing and return the latest handle
    pub async fn stop(self) -> LockHandle {
        self.state.shutdown_notify.notify_one();
        if let Err(e) = self.join_handle.await {
            warn!(error = %e, "Lease heartbeat task ended abnormally");
        }
        self.state.current.lock().clone()
    }
}

async fn heartbeat_loop(
    locks: Arc<dyn LockManager>,
    state: Arc<KeeperState>,
    lease: Duration,
    interval: Duration,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = state.shutdown_notify.notified() => {
                debug!("Lease heartbeat stopped");
                break;
            }
        }

        let handle = state.current.lock().clone();
        match locks.renew(&handle, lease).await {
            Ok(renewed) => {
                debug!(lock_key = %renewed.lock_key, remaining_ms = renewed.remaining().as_millis() as u64, "💓 Lease renewed");
                *state.current.lock() = renewed;
            }
            Err(e) => {
                warn!(lock_key = %handle.lock_key, error = %e, "Lease lost; stopping heartbeat");
                state.lost.store(true, Ordering::Release);
                break;
            }
        }
    }
    info!("Lease heartbeat ended");
}
