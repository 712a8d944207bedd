use crate::error::Result;
use crate::models::QueryTaskNotification;
use crate::messaging::NotificationStream;
use crate::store::{ClaimedTask, TaskStore};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Turns "task ready" notifications for one pool into claimed tasks.
///
/// Hints are at-least-once and may be stale: a hint whose task is already
/// claimed, finished or cleared is skipped silently.
pub struct NotificationListener {
    store: Arc<TaskStore>,
    pool: String,
    holder_id: String,
    lease: Duration,
    stream: NotificationStream,
}

impl std::fmt::Debug for NotificationListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationListener")
            .field("pool", &self.pool)
            .field("holder_id", &self.holder_id)
            .field("lease", &self.lease)
            .finish()
    }
}

impl NotificationListener {
    /// Subscribe to `pool`. Only hints published after this call are seen.
    pub async fn subscribe(
        store: Arc<TaskStore>,
        pool: impl Into<String>,
        holder_id: impl Into<String>,
        lease: Duration,
    ) -> Result<Self> {
        let pool = pool.into();
        let stream = store.notifier().subscribe(&pool).await?;
        let holder_id = holder_id.into();
        info!(pool = %pool, holder_id = %holder_id, "👂 Listening for ready tasks");

        Ok(Self {
            store,
            pool,
            holder_id,
            lease,
            stream,
        })
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Wait for the next hint that yields a successful claim. `None` once the
    /// subscription ends.
    pub async fn next_claim(&mut self) -> Result<Option<ClaimedTask>> {
        while let Some(notification) = self.stream.next().await {
            if let Some(claimed) = self.try_claim(&notification).await? {
                return Ok(Some(claimed));
            }
        }
        Ok(None)
    }

    /// The next raw hint, without claiming. `None` once the subscription ends.
    pub async fn next_notification(&mut self) -> Option<QueryTaskNotification> {
        self.stream.next().await
    }

    /// Try to claim the task named by `notification`. Contention and stale
    /// hints yield `None`; other failures are returned.
    pub async fn try_claim(&self, notification: &QueryTaskNotification) -> Result<Option<ClaimedTask>> {
        if notification.query_pool != self.pool {
            return Ok(None);
        }
        let task_key = notification.task_key();
        match self
            .store
            .claim_task(&task_key, &self.holder_id, self.lease)
            .await
        {
            Ok(claimed) => Ok(Some(claimed)),
            Err(e) if e.is_lock_contention() || e.is_not_found() => {
                debug!(task_key = %task_key, reason = %e, "Ignoring stale or contended hint");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
