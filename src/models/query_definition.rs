//! # Query Definition
//!
//! The submitted query as the store sees it: a type used to pick the
//! decomposer, the query text, and free-form string parameters. The store
//! never parses or plans the query text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDefinition {
    pub query_type: String,
    pub query: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl QueryDefinition {
    pub fn new(query_type: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            query_type: query_type.into(),
            query: query.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Flattened `name -> value` view used by task descriptions
    pub fn describe(&self) -> BTreeMap<String, String> {
        let mut description = self.parameters.clone();
        description.insert("query".to_string(), self.query.clone());
        description.insert("queryType".to_string(), self.query_type.clone());
        description
    }
}
