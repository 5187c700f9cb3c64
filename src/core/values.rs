//! Typed access to JSON-valued maps, shared by extended state and headers.
//!
//! Self-describing formats carry the values inline. Binary formats such as
//! bincode cannot decode a `serde_json::Value` (it needs `deserialize_any`),
//! so there each value travels as its JSON text.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub(crate) type ValueMap = BTreeMap<String, Value>;

/// Errors raised by typed variable access.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VariableError {
    /// A value exists under the key but cannot be read as the requested type.
    #[error("Incorrect type for variable '{key}': expected {expected}, stored value is {actual}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The value could not be converted into a storable representation.
    #[error("Variable '{key}' cannot be stored: {reason}")]
    Unrepresentable { key: String, reason: String },
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode the value stored under `key` as `T`.
pub(crate) fn read<T: DeserializeOwned>(
    map: &ValueMap,
    key: &str,
) -> Result<Option<T>, VariableError> {
    let Some(value) = map.get(key) else {
        return Ok(None);
    };
    T::deserialize(value)
        .map(Some)
        .map_err(|_| VariableError::TypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
            actual: kind_of(value),
        })
}

pub(crate) fn encode<T: Serialize>(key: &str, value: T) -> Result<Value, VariableError> {
    serde_json::to_value(value).map_err(|e| VariableError::Unrepresentable {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn serialize<Ser: Serializer>(map: &ValueMap, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
    if serializer.is_human_readable() {
        return map.serialize(serializer);
    }
    let encoded = map
        .iter()
        .map(|(key, value)| serde_json::to_string(value).map(|text| (key.as_str(), text)))
        .collect::<Result<BTreeMap<&str, String>, _>>()
        .map_err(serde::ser::Error::custom)?;
    encoded.serialize(serializer)
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ValueMap, D::Error> {
    if deserializer.is_human_readable() {
        return ValueMap::deserialize(deserializer);
    }
    BTreeMap::<String, String>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, text)| {
            serde_json::from_str(&text)
                .map(|value| (key, value))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}
