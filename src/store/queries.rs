//! Query-level operations: creation, status, lifecycle, counters, clearing.

use super::TaskStore;
use crate::constants::{checkpoint_properties, storage_keys};
use crate::error::{QueryStorageError, Result};
use crate::logging::log_query_operation;
use crate::models::{
    Checkpoint, PropertyValue, QueryDefinition, QueryKey, QueryState, QueryStatus, QueryTask,
    TaskAction, TaskKey, TaskStates,
};
use crate::registry::QueryDecomposer;
use crate::state_machine::{determine_lifecycle_transition, QueryLifecycle, TaskState};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

struct CreatedQuery {
    /// CREATE task keys in partition order
    task_keys: Vec<TaskKey>,
    /// CREATE tasks still READY, to be announced
    ready: Vec<TaskKey>,
}

fn validate_new_query(
    pool: &str,
    definition: &QueryDefinition,
    authorizations: &BTreeSet<String>,
    initial_task_count: usize,
) -> Result<()> {
    if initial_task_count < 1 {
        return Err(QueryStorageError::invalid_argument(
            "initial task count must be at least 1",
        ));
    }
    if authorizations.is_empty() {
        return Err(QueryStorageError::invalid_argument(
            "authorizations must not be empty",
        ));
    }
    if pool.trim().is_empty() {
        return Err(QueryStorageError::invalid_argument("query pool must not be empty"));
    }
    if definition.query_type.trim().is_empty() {
        return Err(QueryStorageError::invalid_argument("query type must not be empty"));
    }
    Ok(())
}

impl TaskStore {
    /// Create a query under a fresh id and return the key of its first
    /// partition's CREATE task
    pub async fn create_query(
        &self,
        pool: &str,
        definition: QueryDefinition,
        authorizations: BTreeSet<String>,
        initial_task_count: usize,
    ) -> Result<TaskKey> {
        self.create_query_with_id(
            Uuid::new_v4(),
            pool,
            definition,
            authorizations,
            initial_task_count,
        )
        .await
    }

    /// Create a query under a caller-chosen id. Retrying with the same id and
    /// request completes a partially created query instead of duplicating it.
    #[instrument(skip(self, definition, authorizations), fields(query_type = %definition.query_type))]
    pub async fn create_query_with_id(
        &self,
        query_id: Uuid,
        pool: &str,
        definition: QueryDefinition,
        authorizations: BTreeSet<String>,
        initial_task_count: usize,
    ) -> Result<TaskKey> {
        validate_new_query(pool, &definition, &authorizations, initial_task_count)?;
        let query_key = QueryKey::new(query_id, pool, definition.query_type.clone());
        let decomposer = self.registry.resolve(&definition.query_type)?;

        let guard = self.acquire_query_lock(query_id).await?;
        let outcome = self
            .persist_new_query(
                &query_key,
                &definition,
                authorizations,
                initial_task_count,
                decomposer.as_ref(),
            )
            .await;
        self.release_query_lock(&guard).await;
        let created = outcome?;

        // every CREATE task is durable at this point
        for task_key in &created.ready {
            self.announce(task_key).await;
        }

        log_query_operation(
            "create_query",
            query_id,
            Some(pool),
            &QueryLifecycle::Running.to_string(),
            Some(created.task_keys.len()),
        );

        created.task_keys.into_iter().next().ok_or_else(|| {
            QueryStorageError::storage("create_query", format!("query {query_id} has no tasks"))
        })
    }

    async fn persist_new_query(
        &self,
        query_key: &QueryKey,
        definition: &QueryDefinition,
        authorizations: BTreeSet<String>,
        initial_task_count: usize,
        decomposer: &dyn QueryDecomposer,
    ) -> Result<CreatedQuery> {
        let query_id = query_key.query_id;
        let mut status = match self.load_status(query_id).await? {
            Some(existing) => {
                if !existing.matches_request(query_key, definition, initial_task_count) {
                    return Err(QueryStorageError::invalid_argument(format!(
                        "query {query_id} already exists with a different definition"
                    )));
                }
                debug!(query_id = %query_id, "Resuming creation of existing query");
                existing
            }
            None => {
                let status = QueryStatus::new(
                    query_key.clone(),
                    definition.clone(),
                    authorizations,
                    initial_task_count,
                );
                self.save_status(&status).await?;
                status
            }
        };

        let mut states = self.load_states(query_id).await?.unwrap_or_else(|| {
            TaskStates::new(query_key.clone(), self.config.tasks.max_running_per_query)
        });

        // partitions already persisted by an earlier attempt
        let mut partitions: BTreeMap<i64, (TaskKey, TaskState)> = BTreeMap::new();
        let existing: Vec<(TaskKey, TaskState)> = states
            .entries()
            .filter(|(_, entry)| entry.action == TaskAction::Create)
            .map(|(task_id, entry)| (TaskKey::new(*task_id, query_key.clone()), entry.state))
            .collect();
        for (task_key, state) in existing {
            if let Some(task) = self.load_task(&task_key).await? {
                if let Some(partition) = task.checkpoint().partition() {
                    partitions.insert(partition, (task_key, state));
                }
            }
        }

        if partitions.len() < initial_task_count {
            let maps = decomposer.decompose(query_key, definition, initial_task_count)?;
            if maps.len() != initial_task_count {
                return Err(QueryStorageError::invalid_argument(format!(
                    "decomposer {} produced {} partitions, expected {initial_task_count}",
                    decomposer.name(),
                    maps.len()
                )));
            }

            for (index, mut properties) in maps.into_iter().enumerate() {
                let partition = index as i64;
                if partitions.contains_key(&partition) {
                    continue;
                }
                properties.insert(
                    checkpoint_properties::PARTITION.to_string(),
                    PropertyValue::Integer(partition),
                );
                let checkpoint = Checkpoint::initial(query_key.clone(), definition, properties)?;
                let task = QueryTask::new(TaskAction::Create, checkpoint);
                self.save_task(&task).await?;
                states.add_task(task.task_id(), TaskAction::Create);
                partitions.insert(partition, (task.task_key(), TaskState::Ready));
            }
        }

        self.save_states(&states).await?;

        if status.lifecycle == QueryLifecycle::Defined {
            status.lifecycle = QueryLifecycle::Running;
        }
        status.task_counts = states.counts();
        status.touch();
        self.save_status(&status).await?;

        let ready = partitions
            .values()
            .filter(|(_, state)| *state == TaskState::Ready)
            .map(|(task_key, _)| task_key.clone())
            .collect();
        let task_keys = partitions.into_values().map(|(task_key, _)| task_key).collect();

        Ok(CreatedQuery { task_keys, ready })
    }

    pub async fn get_query_status(&self, query_id: Uuid) -> Result<QueryStatus> {
        self.require_status(query_id).await
    }

    /// Every known query status, oldest first
    pub async fn get_query_statuses(&self) -> Result<Vec<QueryStatus>> {
        let mut statuses = Vec::new();
        for (key, bytes) in self.backend.scan_prefix(storage_keys::QUERY_PREFIX).await? {
            match crate::storage::decode::<QueryStatus>(&key, &bytes) {
                Ok(status) => statuses.push(status),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable query status"),
            }
        }
        statuses.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.query_key.cmp(&b.query_key))
        });
        Ok(statuses)
    }

    /// Status and task rollups of one query
    pub async fn get_query_state(&self, query_id: Uuid) -> Result<QueryState> {
        let status = self.require_status(query_id).await?;
        let states = self.load_states(query_id).await?.unwrap_or_else(|| {
            TaskStates::new(status.query_key.clone(), self.config.tasks.max_running_per_query)
        });
        Ok(QueryState::from_parts(&status, &states))
    }

    /// Move the query to `lifecycle` (close or cancel by the caller)
    #[instrument(skip(self))]
    pub async fn update_query_lifecycle(
        &self,
        query_id: Uuid,
        lifecycle: QueryLifecycle,
    ) -> Result<QueryStatus> {
        let status = self
            .mutate_status(query_id, |status| {
                status.lifecycle = determine_lifecycle_transition(status.lifecycle, lifecycle)?;
                Ok(())
            })
            .await?;
        log_query_operation(
            "update_query_lifecycle",
            query_id,
            Some(status.query_pool()),
            &status.lifecycle.to_string(),
            None,
        );
        Ok(status)
    }

    /// Mark the query FAILED with `message`. Tasks are left in place.
    #[instrument(skip(self))]
    pub async fn fail_query(&self, query_id: Uuid, message: &str) -> Result<QueryStatus> {
        let status = self
            .mutate_status(query_id, |status| {
                mark_failed(status, message);
                Ok(())
            })
            .await?;
        log_query_operation(
            "fail_query",
            query_id,
            Some(status.query_pool()),
            &status.lifecycle.to_string(),
            None,
        );
        Ok(status)
    }

    /// Add `count` to the results generated so far; returns the new total
    pub async fn increment_results_generated(&self, query_id: Uuid, count: u64) -> Result<u64> {
        let status = self
            .mutate_status(query_id, |status| {
                status.num_results_generated = status.num_results_generated.saturating_add(count);
                Ok(())
            })
            .await?;
        Ok(status.num_results_generated)
    }

    /// Adjust the number of in-flight NEXT calls by `delta`, never below zero
    pub async fn adjust_active_next_calls(&self, query_id: Uuid, delta: i32) -> Result<u32> {
        let status = self
            .mutate_status(query_id, |status| {
                status.active_next_calls = status.active_next_calls.saturating_add_signed(delta);
                Ok(())
            })
            .await?;
        Ok(status.active_next_calls)
    }

    /// Remove every record of the query. Returns the number of records
    /// deleted; unknown queries delete nothing.
    #[instrument(skip(self))]
    pub async fn clear(&self, query_id: Uuid) -> Result<usize> {
        let guard = self.acquire_query_lock(query_id).await?;
        let outcome = self.clear_locked(query_id).await;
        self.release_query_lock(&guard).await;
        let removed = outcome?;
        self.purge_lapsed_leases().await?;

        if removed > 0 {
            log_query_operation("clear", query_id, None, "CLEARED", Some(removed));
        }
        Ok(removed)
    }

    async fn clear_locked(&self, query_id: Uuid) -> Result<usize> {
        let mut removed = 0;

        // tracked tasks, plus records orphaned by an interrupted create
        let marker = format!(":{query_id}:");
        let mut task_storage_keys: BTreeSet<String> = BTreeSet::new();
        if let Some(states) = self.load_states(query_id).await? {
            task_storage_keys.extend(states.task_keys().iter().map(TaskKey::storage_key));
        }
        for (key, _) in self.backend.scan_prefix(storage_keys::TASK_PREFIX).await? {
            if key.contains(&marker) {
                task_storage_keys.insert(key);
            }
        }

        for key in &task_storage_keys {
            if self.backend.delete(key).await? {
                removed += 1;
            }
            self.locks.force_unlock(key).await?;
        }

        if self.backend.delete(&crate::models::keys::states_storage_key(query_id)).await? {
            removed += 1;
        }
        if self.backend.delete(&crate::models::keys::status_storage_key(query_id)).await? {
            removed += 1;
        }
        Ok(removed)
    }

    /// Remove every query, task and task lease known to the backend
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        for prefix in [
            storage_keys::TASK_PREFIX,
            storage_keys::TASKS_PREFIX,
            storage_keys::QUERY_PREFIX,
        ] {
            for (key, _) in self.backend.scan_prefix(prefix).await? {
                if prefix == storage_keys::TASK_PREFIX {
                    self.locks.force_unlock(&key).await?;
                }
                if self.backend.delete(&key).await? {
                    removed += 1;
                }
            }
        }
        self.purge_lapsed_leases().await?;
        info!(removed = removed, "🧹 Cleared all queries");
        Ok(removed)
    }

    /// Leases left behind by crashed holders on tasks nobody reclaimed
    async fn purge_lapsed_leases(&self) -> Result<usize> {
        let purged = self.locks.purge_expired().await?;
        if purged > 0 {
            debug!(purged = purged, "Purged lapsed leases");
        }
        Ok(purged)
    }

    /// Load, modify and persist the status under the per-query lease
    async fn mutate_status<F>(&self, query_id: Uuid, mutate: F) -> Result<QueryStatus>
    where
        F: FnOnce(&mut QueryStatus) -> Result<()> + Send,
    {
        let guard = self.acquire_query_lock(query_id).await?;
        let outcome = async {
            let mut status = self.require_status(query_id).await?;
            mutate(&mut status)?;
            status.touch();
            self.save_status(&status).await?;
            Ok(status)
        }
        .await;
        self.release_query_lock(&guard).await;
        outcome
    }
}

/// FAILED where the lifecycle allows it; the message is always recorded
pub(super) fn mark_failed(status: &mut QueryStatus, message: &str) {
    match determine_lifecycle_transition(status.lifecycle, QueryLifecycle::Failed) {
        Ok(lifecycle) => status.lifecycle = lifecycle,
        Err(_) => debug!(
            query_id = %status.query_key.query_id,
            lifecycle = %status.lifecycle,
            "Query already finished; recording failure message only"
        ),
    }
    status.failure_message = Some(message.to_string());
}
