use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-task execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Persisted and lockable
    Ready,
    /// Held by exactly one lease holder
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl TaskState {
    pub const ALL: [TaskState; 4] = [Self::Ready, Self::Running, Self::Completed, Self::Failed];

    /// Terminal for the task, not for the query
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "READY"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "READY" => Ok(Self::Ready),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

/// Lifecycle marker of a whole query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryLifecycle {
    /// Status persisted, tasks not yet created
    Defined,
    /// Tasks created and available to workers
    Running,
    /// Closed by the caller
    Closed,
    /// Canceled by the caller
    Canceled,
    /// A task failed or the query was failed explicitly
    Failed,
}

impl QueryLifecycle {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Canceled | Self::Failed)
    }

    /// Whether NEXT and CREATE tasks of the query should still be handed out
    pub fn accepts_work(&self) -> bool {
        matches!(self, Self::Defined | Self::Running)
    }
}

impl fmt::Display for QueryLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defined => write!(f, "DEFINED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for QueryLifecycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEFINED" => Ok(Self::Defined),
            "RUNNING" => Ok(Self::Running),
            "CLOSED" => Ok(Self::Closed),
            "CANCELED" => Ok(Self::Canceled),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid query lifecycle: {s}")),
        }
    }
}
