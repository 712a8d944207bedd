pub mod query_storage_state_service;

pub use query_storage_state_service::{QueryStorageStateService, TaskStoreStateService};
