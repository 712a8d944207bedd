//! # Query Task
//!
//! One unit of work: an action and the checkpoint it resumes from.
//! `CREATE` tasks start a partition, `NEXT` tasks continue one, and a
//! `CLOSE` task asks the execution engine to release query resources.

use crate::models::{Checkpoint, QueryKey, TaskKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskAction {
    Create,
    Next,
    Close,
}

impl TaskAction {
    pub const ALL: [TaskAction; 3] = [Self::Create, Self::Next, Self::Close];
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Next => write!(f, "NEXT"),
            Self::Close => write!(f, "CLOSE"),
        }
    }
}

impl std::str::FromStr for TaskAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "NEXT" => Ok(Self::Next),
            "CLOSE" => Ok(Self::Close),
            _ => Err(format!("Invalid task action: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTask {
    task_id: Uuid,
    action: TaskAction,
    checkpoint: Checkpoint,
    last_updated: DateTime<Utc>,
}

impl QueryTask {
    /// A new task with a freshly minted id
    pub fn new(action: TaskAction, checkpoint: Checkpoint) -> Self {
        Self::with_id(Uuid::new_v4(), action, checkpoint)
    }

    pub fn with_id(task_id: Uuid, action: TaskAction, checkpoint: Checkpoint) -> Self {
        Self {
            task_id,
            action,
            checkpoint,
            last_updated: Utc::now(),
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn action(&self) -> TaskAction {
        self.action
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn query_key(&self) -> &QueryKey {
        self.checkpoint.query_key()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn task_key(&self) -> TaskKey {
        TaskKey::new(self.task_id, self.checkpoint.query_key().clone())
    }

    /// The same task resuming from `checkpoint`
    pub fn with_checkpoint(&self, checkpoint: Checkpoint) -> Self {
        Self::with_id(self.task_id, self.action, checkpoint)
    }
}

impl fmt::Display for QueryTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({} properties)",
            self.action,
            self.task_key(),
            self.checkpoint.properties().len()
        )
    }
}
