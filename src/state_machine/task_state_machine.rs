use super::errors::{StateMachineError, StateMachineResult, MAX_RUNNING_GUARD};
use super::events::TaskEvent;
use super::states::{QueryLifecycle, TaskState};

/// Task transition rules plus the per-query running capacity guard.
///
/// Pure: callers load the current state, ask for the target, and persist it
/// themselves under the per-query lease.
#[derive(Debug, Clone, Copy)]
pub struct TaskStateMachine {
    max_running: usize,
}

impl TaskStateMachine {
    pub fn new(max_running: usize) -> Self {
        Self { max_running }
    }

    pub fn max_running(&self) -> usize {
        self.max_running
    }

    /// Resolve `event` against `current`, given `running` tasks already
    /// RUNNING in the same query
    pub fn transition(
        &self,
        current: TaskState,
        event: &TaskEvent,
        running: usize,
    ) -> StateMachineResult<TaskState> {
        let target = Self::determine_target_state(current, event)?;
        self.check_guards(current, target, running)?;
        Ok(target)
    }

    pub fn determine_target_state(
        current_state: TaskState,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskState> {
        let target = match (current_state, event) {
            // Claim transitions
            (TaskState::Ready, TaskEvent::Claim) => TaskState::Running,
            (TaskState::Running, TaskEvent::Reclaim) => TaskState::Running,

            // Give-back
            (TaskState::Running, TaskEvent::Release) => TaskState::Ready,

            // Terminal transitions
            (TaskState::Running, TaskEvent::Complete) => TaskState::Completed,
            (TaskState::Running, TaskEvent::Fail(_)) => TaskState::Failed,
            (TaskState::Ready, TaskEvent::Fail(_)) => TaskState::Failed,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: Some(from_state.to_string()),
                    to: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    fn check_guards(
        &self,
        current_state: TaskState,
        target_state: TaskState,
        running: usize,
    ) -> StateMachineResult<()> {
        if target_state == TaskState::Running
            && current_state != TaskState::Running
            && running >= self.max_running
        {
            return Err(StateMachineError::GuardFailed {
                reason: format!("{MAX_RUNNING_GUARD} ({running}/{})", self.max_running),
            });
        }
        Ok(())
    }
}

/// Validate a query lifecycle change. Re-applying the current lifecycle is
/// accepted so callers can retry.
pub fn determine_lifecycle_transition(
    current: QueryLifecycle,
    target: QueryLifecycle,
) -> StateMachineResult<QueryLifecycle> {
    use QueryLifecycle::*;

    let allowed = current == target
        || matches!(
            (current, target),
            (Defined, Running)
                | (Defined | Running, Closed | Canceled | Failed)
                | (Closed, Canceled | Failed)
        );

    if allowed {
        Ok(target)
    } else {
        Err(StateMachineError::InvalidTransition {
            from: Some(current.to_string()),
            to: target.to_string(),
        })
    }
}
