//! # Query Storage State Service
//!
//! Read-only administrative view over the task store. Backs the admin
//! façade routes `GET /queries`, `GET /query/{id}` and `GET /tasks/{id}`;
//! `NotFound` maps to 404 and `InvalidArgument` to 400 there.
//!
//! Results are snapshots assembled from several reads and may be slightly
//! stale under concurrent updates.

use crate::error::{QueryStorageError, Result};
use crate::models::{QueryState, TaskDescription};
use crate::store::TaskStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait QueryStorageStateService: Send + Sync {
    /// Every query that is still open or has unfinished tasks
    async fn get_running_queries(&self) -> Result<Vec<QueryState>>;

    async fn get_running_queries_by_type(&self, query_type: &str) -> Result<Vec<QueryState>>;

    async fn get_running_queries_by_pool(&self, query_pool: &str) -> Result<Vec<QueryState>>;

    /// `NotFound` if the query is unknown
    async fn get_query(&self, query_id: Uuid) -> Result<QueryState>;

    /// `NotFound` if the query is unknown
    async fn get_tasks(&self, query_id: Uuid) -> Result<Vec<TaskDescription>>;
}

/// [`QueryStorageStateService`] backed directly by a [`TaskStore`]
#[derive(Debug, Clone)]
pub struct TaskStoreStateService {
    store: Arc<TaskStore>,
}

impl TaskStoreStateService {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }

    async fn running_where<F>(&self, include: F) -> Result<Vec<QueryState>>
    where
        F: Fn(&QueryState) -> bool + Send + Sync,
    {
        let mut running = Vec::new();
        for status in self.store.get_query_statuses().await? {
            match self.store.get_query_state(status.query_key.query_id).await {
                Ok(state) if state.is_running() && include(&state) => running.push(state),
                Ok(_) => {}
                // Cleared between the listing and the lookup
                Err(QueryStorageError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(running)
    }
}

#[async_trait]
impl QueryStorageStateService for TaskStoreStateService {
    async fn get_running_queries(&self) -> Result<Vec<QueryState>> {
        self.running_where(|_| true).await
    }

    async fn get_running_queries_by_type(&self, query_type: &str) -> Result<Vec<QueryState>> {
        self.running_where(|state| state.query_type == query_type).await
    }

    async fn get_running_queries_by_pool(&self, query_pool: &str) -> Result<Vec<QueryState>> {
        self.running_where(|state| state.query_pool == query_pool).await
    }

    async fn get_query(&self, query_id: Uuid) -> Result<QueryState> {
        self.store.get_query_state(query_id).await
    }

    async fn get_tasks(&self, query_id: Uuid) -> Result<Vec<TaskDescription>> {
        // Fails NotFound for an unknown query
        self.store.get_query_status(query_id).await?;

        let mut descriptions = Vec::new();
        for task_key in self.store.get_tasks(query_id).await? {
            match self.store.get_task(&task_key).await {
                Ok(task) => descriptions.push(TaskDescription::from_task(&task)),
                Err(e) if e.is_not_found() => {
                    debug!(task_key = %task_key, "Task vanished while listing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(descriptions)
    }
}
