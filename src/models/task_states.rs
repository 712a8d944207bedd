//! # Task State Tracker
//!
//! Per-query map of `task_id -> entry` with the derived rollup counts.
//! Every mutation goes through `TaskStateMachine`, so an entry can only move
//! along legal transitions and a query never exceeds `max_running` RUNNING
//! tasks.

use crate::models::{QueryKey, TaskAction, TaskKey};
use crate::state_machine::{StateMachineError, StateMachineResult, TaskEvent, TaskState, TaskStateMachine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Index;
use uuid::Uuid;

/// Number of tasks in each `TaskState`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    pub ready: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    fn slot(&mut self, state: TaskState) -> &mut usize {
        match state {
            TaskState::Ready => &mut self.ready,
            TaskState::Running => &mut self.running,
            TaskState::Completed => &mut self.completed,
            TaskState::Failed => &mut self.failed,
        }
    }

    pub fn total(&self) -> usize {
        self.ready + self.running + self.completed + self.failed
    }

    /// READY plus RUNNING
    pub fn unfinished(&self) -> usize {
        self.ready + self.running
    }
}

impl Index<TaskState> for TaskCounts {
    type Output = usize;

    fn index(&self, state: TaskState) -> &usize {
        match state {
            TaskState::Ready => &self.ready,
            TaskState::Running => &self.running,
            TaskState::Completed => &self.completed,
            TaskState::Failed => &self.failed,
        }
    }
}

/// Number of tasks per `TaskAction`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCounts {
    pub create: usize,
    pub next: usize,
    pub close: usize,
}

impl Index<TaskAction> for ActionCounts {
    type Output = usize;

    fn index(&self, action: TaskAction) -> &usize {
        match action {
            TaskAction::Create => &self.create,
            TaskAction::Next => &self.next,
            TaskAction::Close => &self.close,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEntry {
    pub action: TaskAction,
    pub state: TaskState,
    /// Time of the last state change
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStates {
    query_key: QueryKey,
    max_running: usize,
    tasks: BTreeMap<Uuid, TaskEntry>,
}

impl TaskStates {
    pub fn new(query_key: QueryKey, max_running: usize) -> Self {
        Self {
            query_key,
            max_running,
            tasks: BTreeMap::new(),
        }
    }

    pub fn query_key(&self) -> &QueryKey {
        &self.query_key
    }

    pub fn max_running(&self) -> usize {
        self.max_running
    }

    /// Track a new READY task. Returns false if the task was already tracked.
    pub fn add_task(&mut self, task_id: Uuid, action: TaskAction) -> bool {
        if self.tasks.contains_key(&task_id) {
            return false;
        }
        self.tasks.insert(
            task_id,
            TaskEntry {
                action,
                state: TaskState::Ready,
                updated_at: Utc::now(),
            },
        );
        true
    }

    pub fn remove_task(&mut self, task_id: &Uuid) -> Option<TaskEntry> {
        self.tasks.remove(task_id)
    }

    pub fn entry(&self, task_id: &Uuid) -> Option<&TaskEntry> {
        self.tasks.get(task_id)
    }

    pub fn state(&self, task_id: &Uuid) -> Option<TaskState> {
        self.tasks.get(task_id).map(|entry| entry.state)
    }

    /// Apply `event` to a tracked task and return its new state
    pub fn apply(&mut self, task_id: &Uuid, event: &TaskEvent) -> StateMachineResult<TaskState> {
        let running = self.counts().running;
        let machine = TaskStateMachine::new(self.max_running);
        let entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StateMachineError::UnknownTask {
                task_id: task_id.to_string(),
            })?;

        let target = machine.transition(entry.state, event, running)?;
        entry.state = target;
        entry.updated_at = Utc::now();
        Ok(target)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Uuid, &TaskEntry)> {
        self.tasks.iter()
    }

    pub fn task_keys(&self) -> Vec<TaskKey> {
        self.tasks
            .keys()
            .map(|task_id| TaskKey::new(*task_id, self.query_key.clone()))
            .collect()
    }

    pub fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for entry in self.tasks.values() {
            *counts.slot(entry.state) += 1;
        }
        counts
    }

    pub fn action_counts(&self) -> ActionCounts {
        let mut counts = ActionCounts::default();
        for entry in self.tasks.values() {
            match entry.action {
                TaskAction::Create => counts.create += 1,
                TaskAction::Next => counts.next += 1,
                TaskAction::Close => counts.close += 1,
            }
        }
        counts
    }

    pub fn has_unfinished_tasks(&self) -> bool {
        self.tasks.values().any(|entry| !entry.state.is_terminal())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
