// State machine module for task and query lifecycles
//
// Transitions are pure functions over the current state; the task store
// persists the outcome under its per-query lease.

pub mod errors;
pub mod events;
pub mod states;
pub mod task_state_machine;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::TaskEvent;
pub use states::{QueryLifecycle, TaskState};
pub use task_state_machine::{determine_lifecycle_transition, TaskStateMachine};
