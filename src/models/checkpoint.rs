//! # Checkpoint
//!
//! A checkpoint is the resumable state of one task: the owning query key and
//! a map of self-describing property values. The store treats the properties
//! as opaque except for the reserved `QUERY` property, which carries the
//! serialized query definition on CREATE checkpoints.
//!
//! Checkpoints are immutable snapshots. Updating a task persists a new value;
//! a caller holding an older value never observes the change.

use crate::constants::checkpoint_properties;
use crate::error::{QueryStorageError, Result};
use crate::models::{QueryDefinition, QueryKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A tagged, self-describing checkpoint property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// JSON has no encoding for NaN or infinities
    pub fn is_encodable(&self) -> bool {
        match self {
            Self::Float(value) => value.is_finite(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Bytes(value) => write!(f, "<{} bytes>", value.len()),
            Self::Json(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Ordered so that serialization is deterministic
pub type PropertyMap = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    query_key: QueryKey,
    #[serde(default)]
    properties: PropertyMap,
}

impl Checkpoint {
    pub fn new(query_key: QueryKey, properties: PropertyMap) -> Self {
        Self {
            query_key,
            properties,
        }
    }

    pub fn empty(query_key: QueryKey) -> Self {
        Self::new(query_key, PropertyMap::new())
    }

    /// Initial checkpoint of a CREATE task: `properties` plus the reserved
    /// `QUERY` property holding `definition`
    pub fn initial(
        query_key: QueryKey,
        definition: &QueryDefinition,
        mut properties: PropertyMap,
    ) -> Result<Self> {
        let serialized = serde_json::to_value(definition)?;
        properties.insert(
            checkpoint_properties::QUERY.to_string(),
            PropertyValue::Json(serialized),
        );
        Ok(Self::new(query_key, properties))
    }

    pub fn query_key(&self) -> &QueryKey {
        &self.query_key
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// A new snapshot with `name` set to `value`
    pub fn with_property(&self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        let mut properties = self.properties.clone();
        properties.insert(name.into(), value.into());
        Self::new(self.query_key.clone(), properties)
    }

    /// A new snapshot with `name` removed
    pub fn without_property(&self, name: &str) -> Self {
        let mut properties = self.properties.clone();
        properties.remove(name);
        Self::new(self.query_key.clone(), properties)
    }

    pub fn partition(&self) -> Option<i64> {
        self.property(checkpoint_properties::PARTITION)
            .and_then(PropertyValue::as_i64)
    }

    /// Decode the reserved `QUERY` property, if present
    pub fn query_definition(&self) -> Result<Option<QueryDefinition>> {
        match self.property(checkpoint_properties::QUERY) {
            None => Ok(None),
            Some(PropertyValue::Json(value)) => Ok(Some(serde_json::from_value(value.clone())?)),
            Some(other) => Err(QueryStorageError::Serialization(format!(
                "{} property must be json, found {}",
                checkpoint_properties::QUERY,
                other.type_name()
            ))),
        }
    }

    /// `InvalidArgument` if any property cannot be persisted
    pub fn validate(&self) -> Result<()> {
        match self.properties.iter().find(|(_, value)| !value.is_encodable()) {
            Some((name, value)) => Err(QueryStorageError::invalid_argument(format!(
                "checkpoint property {name} has non-finite value {value}"
            ))),
            None => Ok(()),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
