#![allow(clippy::doc_markdown)] // Allow technical terms like QueryStatus, TaskStates in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Query Storage
//!
//! Task storage and coordination core for long-running federated queries.
//!
//! ## Overview
//!
//! A query is decomposed into independently executable **tasks**, one per
//! partition. Each task carries a resumable **checkpoint**. A pool of
//! stateless workers pulls tasks, executes them under a time-bounded
//! exclusive **lease**, persists progress, and hands follow-on work back to
//! the store. A crashed worker simply stops renewing; its lease lapses and the
//! task becomes claimable again.
//!
//! ## Architecture
//!
//! There is no central scheduler. Coordination happens entirely through:
//!
//! - a [`storage::StorageBackend`] holding `QUERY:`, `TASKS:` and `TASK:` records
//! - a [`locking::LockManager`] granting leased exclusive locks
//! - a [`messaging::MessageBus`] carrying best-effort "task ready" hints
//!
//! ## Module Organization
//!
//! - [`store`] - Task store: query creation, claiming, checkpoints, completion
//! - [`locking`] - Leased exclusive locks
//! - [`priority`] - Next-task selection policies
//! - [`messaging`] - Bus abstraction and task notifier
//! - [`registry`] - Per-`query_type` decomposers resolved at startup
//! - [`services`] - Read-only administrative API
//! - [`worker`] - Notification listener and lease heartbeat
//! - [`state_machine`] - Task and query lifecycle transitions
//! - [`models`] - Keys, checkpoints, records and projections
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use query_storage::config::QueryStorageConfig;
//! use query_storage::models::QueryDefinition;
//! use query_storage::priority::FifoPolicy;
//! use query_storage::store::{TaskProgress, TaskStore};
//! use std::collections::BTreeSet;
//! use std::time::Duration;
//!
//! # async fn example() -> query_storage::Result<()> {
//! let store = TaskStore::in_memory(QueryStorageConfig::default())?;
//!
//! store
//!     .create_query(
//!         "default",
//!         QueryDefinition::new("EventQuery", "A == 'b'"),
//!         BTreeSet::from(["U".to_string()]),
//!         3,
//!     )
//!     .await?;
//!
//! if let Some(work) = store
//!     .get_query(&FifoPolicy, "default", "worker-1", Duration::from_secs(300))
//!     .await?
//! {
//!     store.advance_task(&work.lease, TaskProgress::Exhausted).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod locking;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod priority;
pub mod registry;
pub mod services;
pub mod state_machine;
pub mod storage;
pub mod store;
pub mod worker;

pub use config::{ConfigManager, ConfigurationError, QueryStorageConfig};
pub use constants::{checkpoint_properties, storage_keys, system};
pub use error::{QueryStorageError, Result};
pub use locking::{InMemoryLockManager, LockHandle, LockManager, TaskLease};
pub use messaging::{InMemoryMessageBus, MessageBus, TaskNotifier};
pub use models::{
    Checkpoint, PropertyMap, PropertyValue, QueryDefinition, QueryKey, QueryState, QueryStatus,
    QueryTask, QueryTaskNotification, TaskAction, TaskDescription, TaskKey,
};
pub use priority::{build_policy, FifoPolicy, HighestFirstPolicy, PriorityPolicy, RoundRobinPolicy};
pub use services::{QueryStorageStateService, TaskStoreStateService};
pub use state_machine::{QueryLifecycle, TaskState};
pub use storage::{InMemoryBackend, StorageBackend};
pub use store::{ClaimedTask, TaskProgress, TaskStore, TaskStoreBuilder, WorkAssignment};
pub use worker::{LeaseKeeper, NotificationListener};
