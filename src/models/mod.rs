pub mod checkpoint;
pub mod keys;
pub mod notification;
pub mod query_definition;
pub mod query_state;
pub mod query_status;
pub mod query_task;
pub mod task_states;

// Re-export core models for easy access
pub use checkpoint::{Checkpoint, PropertyMap, PropertyValue};
pub use keys::{QueryKey, TaskKey};
pub use notification::QueryTaskNotification;
pub use query_definition::QueryDefinition;
pub use query_state::{QueryState, TaskDescription};
pub use query_status::QueryStatus;
pub use query_task::{QueryTask, TaskAction};
pub use task_states::{ActionCounts, TaskCounts, TaskEntry, TaskStates};
