//! Versioned wire form of a snapshot.

use super::error::SnapshotError;
use super::snapshot::StateMachineContext;
use crate::core::{EventId, StateId};
use serde::{Deserialize, Serialize};

/// Version identifier for the snapshot envelope format
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A snapshot tagged with its format version, ready to be stored or sent.
///
/// # Example
///
/// ```rust
/// use chorus::context::{SnapshotEnvelope, StateMachineContext};
/// use chorus::core::ExtendedState;
///
/// let ctx: StateMachineContext<String, String> =
///     StateMachineContext::new(Some("S1".to_string()), ExtendedState::new());
///
/// let json = SnapshotEnvelope::new(ctx.clone()).to_json().unwrap();
/// let back = SnapshotEnvelope::<String, String>::from_json(&json).unwrap();
/// assert_eq!(back.context, ctx);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct SnapshotEnvelope<S: StateId, E: EventId> {
    pub format_version: u32,
    pub context: StateMachineContext<S, E>,
}

/// Leading field of every envelope, decoded first to reject unknown formats
/// before the body is parsed.
#[derive(Deserialize)]
struct FormatHeader {
    format_version: u32,
}

impl<S: StateId, E: EventId> SnapshotEnvelope<S, E> {
    pub fn new(context: StateMachineContext<S, E>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            context,
        }
    }

    pub fn into_context(self) -> StateMachineContext<S, E> {
        self.context
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self).map_err(|e| SnapshotError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let header: FormatHeader =
            serde_json::from_str(json).map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))?;
        check_version(header.format_version)?;
        serde_json::from_str(json).map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))
    }

    /// Compact encoding via bincode.
    pub fn to_binary(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(|e| SnapshotError::SerializationFailed(e.to_string()))
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self, SnapshotError> {
        // The version is the first field, so it can be read on its own.
        let found: u32 =
            bincode::deserialize(bytes).map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))?;
        check_version(found)?;
        bincode::deserialize(bytes).map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))
    }
}

fn check_version(found: u32) -> Result<(), SnapshotError> {
    if found == SNAPSHOT_FORMAT_VERSION {
        Ok(())
    } else {
        Err(SnapshotError::UnsupportedVersion {
            found,
            supported: SNAPSHOT_FORMAT_VERSION,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExtendedState, MessageHeaders};
    use uuid::Uuid;

    fn sample() -> StateMachineContext<String, String> {
        let mut vars = ExtendedState::new();
        vars.put("foo", 1).unwrap();
        vars.put("label", "ready").unwrap();
        let headers = MessageHeaders::new().with("attempt", 3).unwrap();

        StateMachineContext::new(Some("P".to_string()), vars)
            .with_children(vec![
                StateMachineContext::new(Some("A2".to_string()), ExtendedState::new()),
                StateMachineContext::new(Some("B1".to_string()), ExtendedState::new()),
            ])
            .with_event(Some("E1".to_string()), Some(headers))
            .with_version(7)
            .with_machine_id(Uuid::new_v4())
    }

    #[test]
    fn binary_encoding_preserves_nested_context() {
        let ctx = sample();
        let bytes = SnapshotEnvelope::new(ctx.clone()).to_binary().unwrap();
        let back = SnapshotEnvelope::<String, String>::from_binary(&bytes).unwrap();

        assert_eq!(back.context, ctx);
        assert_eq!(back.context.extended_state.get::<String>("label").unwrap(), Some("ready".to_string()));
    }

    #[test]
    fn json_encoding_is_readable() {
        let json = SnapshotEnvelope::new(sample()).to_json().unwrap();

        assert!(json.contains("\"format_version\": 1"));
        assert!(json.contains("\"foo\": 1"));
    }

    #[test]
    fn unsupported_json_version_is_rejected() {
        let mut envelope = SnapshotEnvelope::new(sample());
        envelope.format_version = 99;
        let json = serde_json::to_string(&envelope).unwrap();

        let result = SnapshotEnvelope::<String, String>::from_json(&json);
        assert!(matches!(
            result,
            Err(SnapshotError::UnsupportedVersion { found: 99, supported: 1 })
        ));
    }

    #[test]
    fn unsupported_binary_version_is_rejected() {
        let mut envelope = SnapshotEnvelope::new(sample());
        envelope.format_version = 2;
        let bytes = bincode::serialize(&envelope).unwrap();

        let result = SnapshotEnvelope::<String, String>::from_binary(&bytes);
        assert!(matches!(result, Err(SnapshotError::UnsupportedVersion { found: 2, .. })));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let result = SnapshotEnvelope::<String, String>::from_json("{not json");
        assert!(matches!(result, Err(SnapshotError::DeserializationFailed(_))));
    }
}
