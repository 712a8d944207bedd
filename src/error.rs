//! # Query Storage Errors
//!
//! The error taxonomy shared by the store, the lock manager and the admin
//! read API. Callers branch on the variant: `NotFound` maps to 404 and
//! `InvalidArgument` to 400 at the REST façade, `TaskLock` is ordinary
//! contention, and `Storage { retryable: true }` may be retried.

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::state_machine::StateMachineError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryStorageError {
    #[error("Not found: {entity} {id}")]
    NotFound { entity: String, id: String },

    #[error("Task lock unavailable for {lock_key}: {reason}")]
    TaskLock { lock_key: String, reason: String },

    #[error("Lock {lock_key} is not held by {holder_id}")]
    LockNotHeld { lock_key: String, holder_id: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error during {operation}: {message}")]
    Storage {
        operation: String,
        message: String,
        retryable: bool,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    #[error("State transition error: {0}")]
    StateTransition(String),
}

impl QueryStorageError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn task_lock(lock_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TaskLock {
            lock_key: lock_key.into(),
            reason: reason.into(),
        }
    }

    pub fn lock_not_held(lock_key: impl Into<String>, holder_id: impl Into<String>) -> Self {
        Self::LockNotHeld {
            lock_key: lock_key.into(),
            holder_id: holder_id.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// A backend failure that will not go away on retry
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// A backend failure the caller may retry (timeouts, partitions)
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage {
                retryable: true,
                ..
            }
        )
    }

    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Self::TaskLock { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for QueryStorageError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<ConfigurationError> for QueryStorageError {
    fn from(error: ConfigurationError) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl From<MessagingError> for QueryStorageError {
    fn from(error: MessagingError) -> Self {
        Self::Messaging(error.to_string())
    }
}

impl From<StateMachineError> for QueryStorageError {
    fn from(error: StateMachineError) -> Self {
        Self::StateTransition(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QueryStorageError>;
