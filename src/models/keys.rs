//! # Query and Task Identity
//!
//! `QueryKey` identifies a query within a pool; `TaskKey` identifies one task
//! of that query. Both are immutable values with structural equality, and a
//! `TaskKey` is minted exactly once per task.
//!
//! The canonical task form `taskId:queryId:queryType` is the storage key body
//! and the lock key body. The pool is carried alongside and is not part of it.

use crate::constants::storage_keys;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryKey {
    pub query_id: Uuid,
    pub query_pool: String,
    pub query_type: String,
}

impl QueryKey {
    pub fn new(query_id: Uuid, query_pool: impl Into<String>, query_type: impl Into<String>) -> Self {
        Self {
            query_id,
            query_pool: query_pool.into(),
            query_type: query_type.into(),
        }
    }

    /// `QUERY:<queryId>`
    pub fn status_storage_key(&self) -> String {
        status_storage_key(self.query_id)
    }

    /// `TASKS:<queryId>`
    pub fn states_storage_key(&self) -> String {
        states_storage_key(self.query_id)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.query_pool, self.query_id, self.query_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskKey {
    pub task_id: Uuid,
    pub query_key: QueryKey,
}

impl TaskKey {
    pub fn new(task_id: Uuid, query_key: QueryKey) -> Self {
        Self { task_id, query_key }
    }

    /// Mint a key for a brand new task of `query_key`
    pub fn generate(query_key: QueryKey) -> Self {
        Self::new(Uuid::new_v4(), query_key)
    }

    pub fn query_id(&self) -> Uuid {
        self.query_key.query_id
    }

    pub fn query_pool(&self) -> &str {
        &self.query_key.query_pool
    }

    pub fn query_type(&self) -> &str {
        &self.query_key.query_type
    }

    /// Canonical `taskId:queryId:queryType` form
    pub fn canonical(&self) -> String {
        format!(
            "{}:{}:{}",
            self.task_id, self.query_key.query_id, self.query_key.query_type
        )
    }

    /// `TASK:<taskId:queryId:queryType>`, shared by the task record and its lock
    pub fn storage_key(&self) -> String {
        format!("{}{}", storage_keys::TASK_PREFIX, self.canonical())
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

pub fn status_storage_key(query_id: Uuid) -> String {
    format!("{}{}", storage_keys::QUERY_PREFIX, query_id)
}

pub fn states_storage_key(query_id: Uuid) -> String {
    format!("{}{}", storage_keys::TASKS_PREFIX, query_id)
}
