use super::{PriorityPolicy, ReadyTaskSummary};
use crate::config::PriorityConfig;
use crate::models::TaskKey;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

/// Oldest READY task first
#[derive(Debug, Default, Clone, Copy)]
pub struct FifoPolicy;

impl PriorityPolicy for FifoPolicy {
    fn select_next(&self, candidates: &[ReadyTaskSummary]) -> Option<TaskKey> {
        candidates
            .iter()
            .min_by(|a, b| a.fifo_order(b))
            .map(|summary| summary.task_key.clone())
    }

    fn name(&self) -> &'static str {
        "fifo"
    }
}

/// Heaviest pool first, FIFO within equal weight
#[derive(Debug, Default, Clone)]
pub struct HighestFirstPolicy {
    weights: HashMap<String, u32>,
}

impl HighestFirstPolicy {
    pub fn new(weights: HashMap<String, u32>) -> Self {
        Self { weights }
    }

    pub fn from_config(config: &PriorityConfig) -> Self {
        Self::new(
            config
                .pool_weights
                .iter()
                .map(|entry| (entry.pool.clone(), entry.weight))
                .collect(),
        )
    }

    pub fn weight(&self, pool: &str) -> u32 {
        self.weights.get(pool).copied().unwrap_or(1)
    }
}

impl PriorityPolicy for HighestFirstPolicy {
    fn select_next(&self, candidates: &[ReadyTaskSummary]) -> Option<TaskKey> {
        candidates
            .iter()
            .min_by(|a, b| {
                self.weight(b.pool())
                    .cmp(&self.weight(a.pool()))
                    .then_with(|| a.fifo_order(b))
            })
            .map(|summary| summary.task_key.clone())
    }

    fn name(&self) -> &'static str {
        "highest_first"
    }
}

/// Rotates across pools present in the candidate set, FIFO within a pool
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    last_pool: Mutex<Option<String>>,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PriorityPolicy for RoundRobinPolicy {
    fn select_next(&self, candidates: &[ReadyTaskSummary]) -> Option<TaskKey> {
        let pools: BTreeSet<&str> = candidates.iter().map(ReadyTaskSummary::pool).collect();
        let mut last_pool = self.last_pool.lock();

        let pool = match last_pool.as_deref() {
            Some(last) => pools
                .range::<str, _>((std::ops::Bound::Excluded(last), std::ops::Bound::Unbounded))
                .next()
                .or_else(|| pools.iter().next())
                .copied(),
            None => pools.iter().next().copied(),
        }?;

        let selected = candidates
            .iter()
            .filter(|summary| summary.pool() == pool)
            .min_by(|a, b| a.fifo_order(b))?;

        *last_pool = Some(pool.to_string());
        Some(selected.task_key.clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
