//! # In-Memory Storage Backend
//!
//! `DashMap`-backed implementation for tests, development and single-process
//! deployments.

use super::StorageBackend;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: DashMap<String, Vec<u8>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|value| value.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut matches: Vec<(String, Vec<u8>)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matches)
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
