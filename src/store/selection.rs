//! Pool-level work selection: gather claimable tasks, let the priority policy
//! pick one, and claim it, retrying past contention.

use super::{TaskStore, WorkAssignment};
use crate::error::{QueryStorageError, Result};
use crate::locking::task_lock_key;
use crate::models::{TaskAction, TaskKey};
use crate::priority::{PriorityPolicy, ReadyTaskSummary};
use crate::state_machine::TaskState;
use std::time::Duration;
use tracing::{debug, instrument, warn};

impl TaskStore {
    /// Claim the next task of `pool` chosen by `policy`.
    ///
    /// Returns `None` when nothing in the pool is claimable. Candidates lost to
    /// another worker, or whose records cannot be read, are dropped and the
    /// policy is asked again. Storage failures end the call.
    #[instrument(skip(self, policy), fields(policy = policy.name()))]
    pub async fn get_query(
        &self,
        policy: &dyn PriorityPolicy,
        pool: &str,
        holder_id: &str,
        lease: Duration,
    ) -> Result<Option<WorkAssignment>> {
        let mut candidates = self.ready_candidates(pool).await?;

        while let Some(task_key) = policy.select_next(&candidates) {
            let Some(position) = candidates.iter().position(|c| c.task_key == task_key) else {
                warn!(task_key = %task_key, "Policy selected a task outside the candidate set");
                break;
            };
            candidates.swap_remove(position);

            let claimed = match self.claim_task(&task_key, holder_id, lease).await {
                Ok(claimed) => claimed,
                Err(e) if e.is_lock_contention() || e.is_not_found() => {
                    debug!(task_key = %task_key, reason = %e, "Candidate lost; trying next");
                    continue;
                }
                Err(e @ (QueryStorageError::Serialization(_) | QueryStorageError::StateTransition(_))) => {
                    warn!(task_key = %task_key, error = %e, "Skipping unclaimable task record");
                    continue;
                }
                Err(e) => return Err(e),
            };

            return match self.get_query_state(task_key.query_id()).await {
                Ok(query_state) => Ok(Some(WorkAssignment {
                    query_state,
                    task: claimed.task,
                    lease: claimed.lease,
                })),
                Err(e) => {
                    if let Err(release_err) = self.release_task(&claimed.lease).await {
                        warn!(task_key = %task_key, error = %release_err, "Failed to hand back task");
                    }
                    Err(e)
                }
            };
        }

        Ok(None)
    }

    /// Claimable tasks of `pool`: READY tasks of queries below their running
    /// limit, plus RUNNING tasks whose lease has lapsed. Only queries still
    /// accepting work contribute, except for their CLOSE tasks.
    pub async fn ready_candidates(&self, pool: &str) -> Result<Vec<ReadyTaskSummary>> {
        let mut candidates = Vec::new();

        for status in self.get_query_statuses().await? {
            if status.query_pool() != pool {
                continue;
            }
            let Some(states) = self.load_states(status.query_key.query_id).await? else {
                continue;
            };
            let at_capacity = states.counts().running >= states.max_running();
            let accepts_work = status.lifecycle.accepts_work();

            for (task_id, entry) in states.entries() {
                if !accepts_work && entry.action != TaskAction::Close {
                    continue;
                }
                let task_key = TaskKey::new(*task_id, status.query_key.clone());
                let claimable = match entry.state {
                    TaskState::Ready => !at_capacity,
                    TaskState::Running => !self.locks.is_locked(&task_lock_key(&task_key)).await?,
                    _ => false,
                };
                if claimable {
                    candidates.push(ReadyTaskSummary {
                        task_key,
                        action: entry.action,
                        ready_since: entry.updated_at,
                        query_created_at: status.created_at,
                    });
                }
            }
        }

        Ok(candidates)
    }
}
