//! Raw provider fragments, as handed over by the transport.

use serde::{Deserialize, Serialize};

/// One provider-shaped payload (typically the JSON body of an SSE `data:` line).
///
/// The shape is provider-specific and only interpreted by the
/// [`ChunkNormalizer`](crate::normalize::ChunkNormalizer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawFragment(pub serde_json::Value);

impl RawFragment {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Parse a JSON payload. Text that is not JSON is kept as a string value
    /// so it can be reported downstream instead of vanishing here.
    pub fn parse(payload: &str) -> Self {
        match serde_json::from_str(payload) {
            Ok(value) => Self(value),
            Err(_) => Self(serde_json::Value::String(payload.to_string())),
        }
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for RawFragment {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}
