//! Event headers carried alongside an event trigger.

use super::values::{self, ValueMap, VariableError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Immutable-by-convention header map attached to a dispatched event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageHeaders {
    #[serde(with = "crate::core::values")]
    entries: ValueMap,
}

impl MessageHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Result<Self, VariableError> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), VariableError> {
        let key = key.into();
        let value = values::encode(&key, value)?;
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, VariableError> {
        values::read(&self.entries, key)
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
