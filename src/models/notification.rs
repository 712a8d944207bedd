//! # Task Notification
//!
//! The "task ready" hint published on the pool topic. It is a re-derivable
//! pointer: consumers re-fetch the task and try to lock it, so duplicate or
//! stale hints are harmless.

use crate::models::{QueryKey, TaskKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTaskNotification {
    pub query_id: Uuid,
    pub query_pool: String,
    pub query_type: String,
    pub task_id: Uuid,
}

impl QueryTaskNotification {
    pub fn task_key(&self) -> TaskKey {
        TaskKey::new(
            self.task_id,
            QueryKey::new(self.query_id, self.query_pool.clone(), self.query_type.clone()),
        )
    }
}

impl From<&TaskKey> for QueryTaskNotification {
    fn from(key: &TaskKey) -> Self {
        Self {
            query_id: key.query_key.query_id,
            query_pool: key.query_key.query_pool.clone(),
            query_type: key.query_key.query_type.clone(),
            task_id: key.task_id,
        }
    }
}
