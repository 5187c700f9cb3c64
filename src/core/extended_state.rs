//! Extended state: the machine's shared, typed variable store.

use super::values::{self, ValueMap, VariableError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat key/value store read by guards and written by actions.
///
/// Keys live in one namespace shared by every region of the machine. Reads
/// of absent keys yield `None`; reads of a present value as an incompatible
/// type fail with [`VariableError::TypeMismatch`].
///
/// The store itself is a plain value. The owning machine serializes access
/// to it, and hands out clones to readers outside a dispatch.
///
/// # Example
///
/// ```rust
/// use chorus::core::ExtendedState;
///
/// let mut vars = ExtendedState::new();
/// vars.put("foo", 1).unwrap();
///
/// assert_eq!(vars.get::<i32>("foo").unwrap(), Some(1));
/// assert_eq!(vars.get::<i32>("bar").unwrap(), None);
/// assert!(vars.get::<String>("foo").is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedState {
    #[serde(with = "crate::core::values")]
    variables: ValueMap,
}

impl ExtendedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a variable as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, VariableError> {
        values::read(&self.variables, key)
    }

    /// Raw stored value, if any.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Store a variable, overwriting any previous value regardless of type.
    pub fn put<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), VariableError> {
        let key = key.into();
        let value = values::encode(&key, value)?;
        self.variables.insert(key, value);
        Ok(())
    }

    pub fn put_value(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.variables.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Iterate variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for ExtendedState {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            variables: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_overwrites_regardless_of_type() {
        let mut vars = ExtendedState::new();
        vars.put("foo", 1).unwrap();
        vars.put("foo", "one").unwrap();

        assert_eq!(vars.get::<String>("foo").unwrap(), Some("one".to_string()));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn mismatched_read_is_an_error_not_a_none() {
        let mut vars = ExtendedState::new();
        vars.put("flag", true).unwrap();

        let err = vars.get::<u64>("flag").unwrap_err();
        assert!(matches!(err, VariableError::TypeMismatch { ref key, .. } if key == "flag"));
    }

    #[test]
    fn structured_values_are_readable_as_structs() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Point {
            x: i32,
            y: i32,
        }

        let mut vars = ExtendedState::new();
        vars.put("p", Point { x: 1, y: 2 }).unwrap();

        assert_eq!(vars.get::<Point>("p").unwrap(), Some(Point { x: 1, y: 2 }));
        assert_eq!(vars.get_value("p"), Some(&json!({"x": 1, "y": 2})));
    }

    #[test]
    fn json_encoding_is_inline() {
        let mut vars = ExtendedState::new();
        vars.put("foo", 1).unwrap();

        let json = serde_json::to_value(&vars).unwrap();
        assert_eq!(json, json!({"variables": {"foo": 1}}));
    }

    #[test]
    fn binary_encoding_round_trips() {
        let mut vars = ExtendedState::new();
        vars.put("foo", 1).unwrap();
        vars.put("names", vec!["a", "b"]).unwrap();
        vars.put_value("nothing", Value::Null);

        let bytes = bincode::serialize(&vars).unwrap();
        let back: ExtendedState = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, vars);
    }

    #[test]
    fn iteration_is_key_ordered() {
        let vars: ExtendedState = vec![
            ("b".to_string(), json!(2)),
            ("a".to_string(), json!(1)),
        ]
        .into_iter()
        .collect();

        let keys: Vec<&str> = vars.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
