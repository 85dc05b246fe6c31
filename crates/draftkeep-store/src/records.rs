/// Persisted record shapes and their boundary validation.
///
/// Records are stored as JSON so that fields added by later schema versions
/// decode cleanly in older ones and vice versa.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collection::Collection;
use crate::error::{StoreError, StoreResult};

/// A record stored under its own `id` field.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// The record's unique key.
    fn id(&self) -> &str;

    /// Checks the record's shape before it is written.
    fn validate(&self) -> Result<(), String> {
        validate_key(self.id())
    }
}

/// A task record: unique `id` plus free-form fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TaskRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl Record for TaskRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

/// An entry in the repo or article history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub date: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl HistoryItem {
    pub fn new(id: impl Into<String>, date: i64) -> Self {
        Self {
            id: id.into(),
            date,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl Record for HistoryItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), String> {
        validate_key(&self.id)?;
        if self.date < 0 {
            return Err(format!("date {} is before the epoch", self.date));
        }
        Ok(())
    }
}

/// Keys must be non-empty and carry no surrounding whitespace.
pub fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("id is empty".to_string());
    }
    if key.trim() != key {
        return Err(format!("id {key:?} has surrounding whitespace"));
    }
    Ok(())
}

pub(crate) fn encode<R: Serialize + ?Sized>(collection: Collection, value: &R) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::malformed(collection, e.to_string()))
}

pub(crate) fn decode<R: DeserializeOwned>(collection: Collection, bytes: &[u8]) -> StoreResult<R> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::malformed(collection, e.to_string()))
}
