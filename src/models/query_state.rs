//! # Read Projections
//!
//! `QueryState` and `TaskDescription` are the views handed to workers and to
//! the admin read API. They are snapshots and never written back.

use crate::constants::checkpoint_properties;
use crate::models::{
    ActionCounts, PropertyValue, QueryStatus, QueryTask, TaskAction, TaskCounts, TaskKey,
    TaskStates,
};
use crate::state_machine::QueryLifecycle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    pub query_id: Uuid,
    pub query_pool: String,
    pub query_type: String,
    pub lifecycle: QueryLifecycle,
    /// Tracked tasks per action
    pub task_counts: ActionCounts,
    /// Tracked tasks per state
    pub task_states: TaskCounts,
    pub created_at: DateTime<Utc>,
}

impl QueryState {
    pub fn from_parts(status: &QueryStatus, states: &TaskStates) -> Self {
        Self {
            query_id: status.query_key.query_id,
            query_pool: status.query_key.query_pool.clone(),
            query_type: status.query_key.query_type.clone(),
            lifecycle: status.lifecycle,
            task_counts: states.action_counts(),
            task_states: states.counts(),
            created_at: status.created_at,
        }
    }

    /// A query is running while its lifecycle is open or any task is unfinished
    pub fn is_running(&self) -> bool {
        !self.lifecycle.is_terminal() || self.task_states.unfinished() > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescription {
    pub task_key: TaskKey,
    pub action: TaskAction,
    pub parameters: BTreeMap<String, String>,
}

impl TaskDescription {
    /// Stringify the checkpoint properties. The reserved `QUERY` property is
    /// flattened into its definition fields.
    pub fn from_task(task: &QueryTask) -> Self {
        let mut parameters = BTreeMap::new();
        for (name, value) in task.checkpoint().properties() {
            if name == checkpoint_properties::QUERY {
                if let PropertyValue::Json(json) = value {
                    if let Ok(definition) =
                        serde_json::from_value::<crate::models::QueryDefinition>(json.clone())
                    {
                        parameters.extend(definition.describe());
                        continue;
                    }
                }
            }
            parameters.insert(name.clone(), value.to_string());
        }

        Self {
            task_key: task.task_key(),
            action: task.action(),
            parameters,
        }
    }
}
