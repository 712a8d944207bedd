//! Task-level operations: lookup, creation, claiming, checkpointing and
//! terminal transitions.

use super::queries::mark_failed;
use super::{ClaimedTask, TaskProgress, TaskStore};
use crate::error::{QueryStorageError, Result};
use crate::locking::{task_lock_key, TaskLease};
use crate::logging::{log_lock_operation, log_task_operation};
use crate::models::{Checkpoint, QueryTask, TaskAction, TaskKey, TaskStates};
use crate::state_machine::{TaskEvent, TaskState};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

impl TaskStore {
    /// `NotFound` if the task or its owning query has been cleared
    pub async fn get_task(&self, task_key: &TaskKey) -> Result<QueryTask> {
        let task = self
            .load_task(task_key)
            .await?
            .ok_or_else(|| QueryStorageError::not_found("task", task_key))?;
        if self.load_status(task_key.query_id()).await?.is_none() {
            return Err(QueryStorageError::not_found("query", task_key.query_id()));
        }
        Ok(task)
    }

    /// Keys of every task of the query, in any state
    pub async fn get_tasks(&self, query_id: Uuid) -> Result<Vec<TaskKey>> {
        Ok(self
            .load_states(query_id)
            .await?
            .map(|states| states.task_keys())
            .unwrap_or_default())
    }

    /// Keys of every task of every query in `pool`
    pub async fn get_tasks_for_pool(&self, pool: &str) -> Result<Vec<TaskKey>> {
        let mut task_keys = Vec::new();
        for status in self.get_query_statuses().await? {
            if status.query_pool() == pool {
                task_keys.extend(self.get_tasks(status.query_key.query_id).await?);
            }
        }
        Ok(task_keys)
    }

    /// Current state of one task
    pub async fn get_task_state(&self, task_key: &TaskKey) -> Result<TaskState> {
        self.load_states(task_key.query_id())
            .await?
            .and_then(|states| states.state(&task_key.task_id))
            .ok_or_else(|| QueryStorageError::not_found("task", task_key))
    }

    /// Persist a new READY task for an existing query, then announce it
    #[instrument(skip(self, checkpoint), fields(query_id = %checkpoint.query_key().query_id))]
    pub async fn create_task(&self, action: TaskAction, checkpoint: Checkpoint) -> Result<QueryTask> {
        checkpoint.validate()?;
        let query_id = checkpoint.query_key().query_id;
        let guard = self.acquire_query_lock(query_id).await?;
        let outcome = async {
            let status = self.require_status(query_id).await?;
            if &status.query_key != checkpoint.query_key() {
                return Err(QueryStorageError::invalid_argument(format!(
                    "checkpoint key {} does not match query {}",
                    checkpoint.query_key(),
                    status.query_key
                )));
            }
            let mut states = self.require_states(query_id).await?;
            let task = self.insert_ready_task(&mut states, action, checkpoint).await?;
            self.save_states(&states).await?;
            self.sync_status_counts(&states).await?;
            Ok(task)
        }
        .await;
        self.release_query_lock(&guard).await;
        let task = outcome?;

        self.announce(&task.task_key()).await;
        log_task_operation(
            "create_task",
            &task.task_key().canonical(),
            Some(&action.to_string()),
            &TaskState::Ready.to_string(),
            None,
        );
        Ok(task)
    }

    /// Lock the task for `holder_id` and move it to RUNNING.
    ///
    /// READY tasks are claimed; RUNNING tasks are reclaimed, which is only
    /// possible once the previous lease has lapsed. Finished tasks, and
    /// queries already at their running limit, surface as `TaskLock`.
    #[instrument(skip(self), fields(task_key = %task_key))]
    pub async fn claim_task(
        &self,
        task_key: &TaskKey,
        holder_id: &str,
        lease: Duration,
    ) -> Result<ClaimedTask> {
        let lock_key = task_lock_key(task_key);
        let handle = self.locks.try_lock(&lock_key, holder_id, lease).await?;

        let guard = match self.acquire_query_lock(task_key.query_id()).await {
            Ok(guard) => guard,
            Err(e) => {
                self.release_quietly(&handle).await;
                return Err(e);
            }
        };
        let outcome = self.mark_running(task_key).await;
        self.release_query_lock(&guard).await;

        match outcome {
            Ok((task, event)) => {
                log_lock_operation(
                    event.event_type(),
                    &lock_key,
                    holder_id,
                    "ACQUIRED",
                    Some(lease.as_millis() as u64),
                );
                Ok(ClaimedTask {
                    task,
                    lease: TaskLease::new(task_key.clone(), handle),
                })
            }
            Err(e) => {
                self.release_quietly(&handle).await;
                Err(e)
            }
        }
    }

    async fn mark_running(&self, task_key: &TaskKey) -> Result<(QueryTask, TaskEvent)> {
        let mut states = self.require_states(task_key.query_id()).await?;
        let current = states
            .state(&task_key.task_id)
            .ok_or_else(|| QueryStorageError::not_found("task", task_key))?;

        let event = match current {
            TaskState::Ready => TaskEvent::Claim,
            TaskState::Running => TaskEvent::Reclaim,
            finished => {
                return Err(QueryStorageError::task_lock(
                    task_lock_key(task_key),
                    format!("task is already {finished}"),
                ))
            }
        };

        let task = self
            .load_task(task_key)
            .await?
            .ok_or_else(|| QueryStorageError::not_found("task", task_key))?;

        states
            .apply(&task_key.task_id, &event)
            .map_err(|e| {
                if e.is_capacity_guard() {
                    QueryStorageError::task_lock(task_lock_key(task_key), e.to_string())
                } else {
                    e.into()
                }
            })?;
        self.save_states(&states).await?;
        self.sync_status_counts(&states).await?;

        if event == TaskEvent::Reclaim {
            info!(task_key = %task_key, "♻️ Reclaimed task after lease expiry");
        }
        Ok((task, event))
    }

    /// Extend the lease of a claimed task
    pub async fn renew_task(&self, lease: &TaskLease, duration: Duration) -> Result<TaskLease> {
        let handle = self.locks.renew(&lease.handle, duration).await?;
        Ok(lease.with_handle(handle))
    }

    /// Persist a new checkpoint for the leased task. The caller's previous
    /// checkpoint values are unaffected.
    #[instrument(skip(self, lease, checkpoint), fields(task_key = %lease.task_key))]
    pub async fn update_checkpoint(&self, lease: &TaskLease, checkpoint: Checkpoint) -> Result<QueryTask> {
        checkpoint.validate()?;
        self.ensure_lease_held(lease).await?;
        if checkpoint.query_key() != &lease.task_key.query_key {
            return Err(QueryStorageError::invalid_argument(format!(
                "checkpoint key {} does not match task {}",
                checkpoint.query_key(),
                lease.task_key
            )));
        }

        let task = self
            .load_task(&lease.task_key)
            .await?
            .ok_or_else(|| QueryStorageError::not_found("task", &lease.task_key))?;
        let updated = task.with_checkpoint(checkpoint);
        self.save_task(&updated).await?;

        debug!(
            task_key = %lease.task_key,
            properties = updated.checkpoint().properties().len(),
            "💾 Checkpoint persisted"
        );
        Ok(updated)
    }

    /// Finish the leased task according to `progress`, spawning the NEXT or
    /// CLOSE follow-on when requested. The lease is released in all cases.
    /// Returns the follow-on task key, if any.
    #[instrument(skip(self, lease, progress), fields(task_key = %lease.task_key))]
    pub async fn advance_task(&self, lease: &TaskLease, progress: TaskProgress) -> Result<Option<TaskKey>> {
        let follow_on = match progress {
            TaskProgress::MoreData(checkpoint) => Some((TaskAction::Next, checkpoint)),
            TaskProgress::Close(checkpoint) => Some((TaskAction::Close, checkpoint)),
            TaskProgress::Exhausted => None,
        };
        self.finish_task(lease, TaskEvent::Complete, follow_on).await
    }

    /// Mark the leased task COMPLETED and release its lease. Repeating the
    /// call once the task is finished is a no-op.
    pub async fn complete_task(&self, lease: &TaskLease) -> Result<()> {
        self.finish_task(lease, TaskEvent::Complete, None).await.map(|_| ())
    }

    /// Mark the leased task FAILED, mark its query FAILED, and release the
    /// lease. Other tasks of the query are left in place.
    pub async fn fail_task(&self, lease: &TaskLease, reason: &str) -> Result<()> {
        self.finish_task(lease, TaskEvent::Fail(reason.to_string()), None)
            .await
            .map(|_| ())
    }

    /// Give the task back as READY without finishing it, and re-announce it
    pub async fn release_task(&self, lease: &TaskLease) -> Result<()> {
        let query_id = lease.task_key.query_id();
        let guard = self.acquire_query_lock(query_id).await?;
        let outcome = async {
            self.ensure_lease_held(lease).await?;
            let mut states = self.require_states(query_id).await?;
            states.apply(&lease.task_key.task_id, &TaskEvent::Release)?;
            self.save_states(&states).await?;
            self.sync_status_counts(&states).await?;
            Ok::<(), QueryStorageError>(())
        }
        .await;
        self.release_query_lock(&guard).await;
        outcome?;

        self.release_quietly(&lease.handle).await;
        self.announce(&lease.task_key).await;
        log_task_operation(
            "release_task",
            &lease.task_key.canonical(),
            None,
            &TaskState::Ready.to_string(),
            Some(lease.holder_id()),
        );
        Ok(())
    }

    async fn finish_task(
        &self,
        lease: &TaskLease,
        event: TaskEvent,
        follow_on: Option<(TaskAction, Checkpoint)>,
    ) -> Result<Option<TaskKey>> {
        let task_key = &lease.task_key;
        if let Some((_, checkpoint)) = &follow_on {
            checkpoint.validate()?;
            if checkpoint.query_key() != &task_key.query_key {
                return Err(QueryStorageError::invalid_argument(format!(
                    "follow-on checkpoint key {} does not match task {}",
                    checkpoint.query_key(),
                    task_key
                )));
            }
        }

        let guard = self.acquire_query_lock(task_key.query_id()).await?;
        let outcome = self.apply_finish(lease, &event, follow_on).await;
        self.release_query_lock(&guard).await;
        let finished = outcome?;

        self.release_quietly(&lease.handle).await;

        let Some((state, follow_on)) = finished else {
            debug!(task_key = %task_key, "Task already finished; nothing to do");
            return Ok(None);
        };

        if let Some(next) = &follow_on {
            self.announce(next).await;
        }
        log_task_operation(
            event.event_type(),
            &task_key.canonical(),
            None,
            &state.to_string(),
            event.error_message(),
        );
        Ok(follow_on)
    }

    /// `None` when the task was already terminal
    async fn apply_finish(
        &self,
        lease: &TaskLease,
        event: &TaskEvent,
        follow_on: Option<(TaskAction, Checkpoint)>,
    ) -> Result<Option<(TaskState, Option<TaskKey>)>> {
        let task_key = &lease.task_key;
        let mut states = self.require_states(task_key.query_id()).await?;
        let current = states
            .state(&task_key.task_id)
            .ok_or_else(|| QueryStorageError::not_found("task", task_key))?;
        if current.is_terminal() {
            return Ok(None);
        }

        self.ensure_lease_held(lease).await?;

        let next_key = match follow_on {
            Some((action, checkpoint)) => Some(
                self.insert_ready_task(&mut states, action, checkpoint)
                    .await?
                    .task_key(),
            ),
            None => None,
        };
        let state = states.apply(&task_key.task_id, event)?;
        self.save_states(&states).await?;

        let mut status = self.require_status(task_key.query_id()).await?;
        status.task_counts = states.counts();
        if let Some(reason) = event.error_message() {
            mark_failed(&mut status, reason);
        }
        status.touch();
        self.save_status(&status).await?;

        Ok(Some((state, next_key)))
    }

    /// Remove the task record and state entry and drop any lease on it.
    /// Returns whether anything was removed.
    #[instrument(skip(self), fields(task_key = %task_key))]
    pub async fn delete_task(&self, task_key: &TaskKey) -> Result<bool> {
        let query_id = task_key.query_id();
        let guard = self.acquire_query_lock(query_id).await?;
        let outcome = async {
            let mut tracked = false;
            if let Some(mut states) = self.load_states(query_id).await? {
                tracked = states.remove_task(&task_key.task_id).is_some();
                if tracked {
                    self.save_states(&states).await?;
                    if self.load_status(query_id).await?.is_some() {
                        self.sync_status_counts(&states).await?;
                    }
                }
            }
            let stored = self.backend.delete(&task_key.storage_key()).await?;
            Ok::<bool, QueryStorageError>(tracked || stored)
        }
        .await;
        self.release_query_lock(&guard).await;
        let removed = outcome?;

        self.locks.force_unlock(&task_lock_key(task_key)).await?;
        if removed {
            log_task_operation("delete_task", &task_key.canonical(), None, "DELETED", None);
        }
        Ok(removed)
    }

    async fn require_states(&self, query_id: Uuid) -> Result<TaskStates> {
        self.load_states(query_id)
            .await?
            .ok_or_else(|| QueryStorageError::not_found("query", query_id))
    }

    /// Persist a READY task and track it in `states`; the caller saves `states`
    async fn insert_ready_task(
        &self,
        states: &mut TaskStates,
        action: TaskAction,
        checkpoint: Checkpoint,
    ) -> Result<QueryTask> {
        let task = QueryTask::new(action, checkpoint);
        self.save_task(&task).await?;
        states.add_task(task.task_id(), action);
        Ok(task)
    }

    async fn ensure_lease_held(&self, lease: &TaskLease) -> Result<()> {
        let lock_key = task_lock_key(&lease.task_key);
        if lease.handle.lock_key != lock_key {
            return Err(QueryStorageError::invalid_argument(format!(
                "lease on {} does not cover task {}",
                lease.handle.lock_key, lease.task_key
            )));
        }
        if !self.locks.is_held(&lease.handle).await? {
            return Err(QueryStorageError::lock_not_held(lock_key, lease.holder_id()));
        }
        Ok(())
    }
}
