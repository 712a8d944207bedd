//! # Executor Registry
//!
//! Resolves a `query_type` to its decomposer. Built once at startup from
//! [`ExecutorsConfig`]; custom decomposers are registered in code before
//! the registry is handed to the store.

use super::decomposers::{QueryDecomposer, RangeDecomposer, SlotDecomposer};
use crate::config::{ConfigResult, ConfigurationError, ExecutorsConfig};
use crate::error::{QueryStorageError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Names accepted in configuration without registering anything in code
pub const BUILTIN_DECOMPOSERS: [&str; 2] = ["slot", "range"];

fn builtin(name: &str) -> Option<Arc<dyn QueryDecomposer>> {
    match name {
        "slot" => Some(Arc::new(SlotDecomposer)),
        "range" => Some(Arc::new(RangeDecomposer)),
        _ => None,
    }
}

#[derive(Debug, Default, Clone)]
pub struct ExecutorRegistry {
    by_query_type: HashMap<String, Arc<dyn QueryDecomposer>>,
    fallback: Option<Arc<dyn QueryDecomposer>>,
}

impl ExecutorRegistry {
    /// An empty registry that rejects every query type
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ExecutorsConfig) -> ConfigResult<Self> {
        Self::from_config_with(config, &HashMap::new())
    }

    /// Like [`from_config`](Self::from_config), also resolving decomposer
    /// names against `custom` implementations
    pub fn from_config_with(
        config: &ExecutorsConfig,
        custom: &HashMap<String, Arc<dyn QueryDecomposer>>,
    ) -> ConfigResult<Self> {
        let lookup = |query_type: &str, name: &str| -> ConfigResult<Arc<dyn QueryDecomposer>> {
            custom
                .get(name)
                .cloned()
                .or_else(|| builtin(name))
                .ok_or_else(|| ConfigurationError::UnknownDecomposer {
                    query_type: query_type.to_string(),
                    decomposer: name.to_string(),
                })
        };

        let mut registry = Self::new();
        for registration in &config.types {
            let decomposer = lookup(&registration.query_type, &registration.decomposer)?;
            registry
                .by_query_type
                .insert(registration.query_type.clone(), decomposer);
        }
        if let Some(name) = &config.default_decomposer {
            registry.fallback = Some(lookup("*", name)?);
        }

        info!(
            query_types = registry.by_query_type.len(),
            fallback = registry.fallback.as_ref().map(|d| d.name()).unwrap_or("none"),
            "Executor registry initialized"
        );
        Ok(registry)
    }

    pub fn register(&mut self, query_type: impl Into<String>, decomposer: Arc<dyn QueryDecomposer>) {
        let query_type = query_type.into();
        debug!(query_type = %query_type, decomposer = decomposer.name(), "Registered decomposer");
        self.by_query_type.insert(query_type, decomposer);
    }

    pub fn set_fallback(&mut self, decomposer: Option<Arc<dyn QueryDecomposer>>) {
        self.fallback = decomposer;
    }

    pub fn resolve(&self, query_type: &str) -> Result<Arc<dyn QueryDecomposer>> {
        self.by_query_type
            .get(query_type)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| {
                QueryStorageError::invalid_argument(format!(
                    "no executor registered for query type {query_type}"
                ))
            })
    }

    pub fn is_registered(&self, query_type: &str) -> bool {
        self.by_query_type.contains_key(query_type)
    }

    pub fn registered_query_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.by_query_type.keys().cloned().collect();
        types.sort();
        types
    }
}
