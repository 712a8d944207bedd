//! # Query Status
//!
//! Aggregate metadata of one query. Created by `create_query`, mutated only
//! by the task store under its per-query lease, deleted on clear.

use crate::models::{QueryDefinition, QueryKey, TaskCounts};
use crate::state_machine::QueryLifecycle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatus {
    pub query_key: QueryKey,
    pub query: QueryDefinition,
    pub authorizations: BTreeSet<String>,
    pub lifecycle: QueryLifecycle,
    pub failure_message: Option<String>,
    pub initial_task_count: usize,
    pub task_counts: TaskCounts,
    pub num_results_generated: u64,
    pub active_next_calls: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl QueryStatus {
    pub fn new(
        query_key: QueryKey,
        query: QueryDefinition,
        authorizations: BTreeSet<String>,
        initial_task_count: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            query_key,
            query,
            authorizations,
            lifecycle: QueryLifecycle::Defined,
            failure_message: None,
            initial_task_count,
            task_counts: TaskCounts::default(),
            num_results_generated: 0,
            active_next_calls: 0,
            created_at: now,
            last_updated: now,
        }
    }

    pub fn query_pool(&self) -> &str {
        &self.query_key.query_pool
    }

    pub fn query_type(&self) -> &str {
        &self.query_key.query_type
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Same query, same partitioning: a retried `create_query`
    pub fn matches_request(
        &self,
        query_key: &QueryKey,
        query: &QueryDefinition,
        initial_task_count: usize,
    ) -> bool {
        &self.query_key == query_key
            && &self.query == query
            && self.initial_task_count == initial_task_count
    }
}
