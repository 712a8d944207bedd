//! # Key-Value Storage Backend
//!
//! The task store persists three record kinds (`QUERY:`, `TASKS:`, `TASK:`)
//! as opaque bytes on any key-value backend implementing
//! [`StorageBackend`]. Record encoding is JSON via [`encode`]/[`decode`].

pub mod in_memory;

pub use in_memory::InMemoryBackend;

use crate::error::{QueryStorageError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Minimal key-value contract required by the task store.
///
/// Implementations report transient failures with
/// [`QueryStorageError::transient`] so callers can retry.
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Returns whether a value was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All entries whose key starts with `prefix`, in key order
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    fn backend_name(&self) -> &'static str;
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| QueryStorageError::Serialization(format!("corrupt record {key}: {e}")))
}
