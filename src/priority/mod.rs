//! # Priority Policies
//!
//! Pluggable selection of the next task among the claimable candidates of a
//! pool. Policies are deterministic for identical input; the round-robin
//! policy also depends on its own prior selections.

pub mod strategies;

pub use strategies::{FifoPolicy, HighestFirstPolicy, RoundRobinPolicy};

use crate::config::{PriorityConfig, PriorityPolicyKind};
use crate::models::{TaskAction, TaskKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

/// What a policy sees of a claimable task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyTaskSummary {
    pub task_key: TaskKey,
    pub action: TaskAction,
    /// When the task last entered READY (or RUNNING, for lapsed leases)
    pub ready_since: DateTime<Utc>,
    pub query_created_at: DateTime<Utc>,
}

impl ReadyTaskSummary {
    pub fn pool(&self) -> &str {
        self.task_key.query_pool()
    }

    /// Oldest first; ties broken by query age, then by key for determinism
    pub fn fifo_order(&self, other: &Self) -> Ordering {
        self.ready_since
            .cmp(&other.ready_since)
            .then_with(|| self.query_created_at.cmp(&other.query_created_at))
            .then_with(|| self.task_key.cmp(&other.task_key))
    }
}

pub trait PriorityPolicy: Send + Sync + Debug {
    fn select_next(&self, candidates: &[ReadyTaskSummary]) -> Option<TaskKey>;

    fn name(&self) -> &'static str;
}

pub fn build_policy(config: &PriorityConfig) -> Arc<dyn PriorityPolicy> {
    match config.policy {
        PriorityPolicyKind::Fifo => Arc::new(FifoPolicy),
        PriorityPolicyKind::HighestFirst => Arc::new(HighestFirstPolicy::from_config(config)),
        PriorityPolicyKind::RoundRobin => Arc::new(RoundRobinPolicy::new()),
    }
}
