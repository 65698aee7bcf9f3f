//! Aggregated results.

use serde::{Deserialize, Serialize};

use super::generation::FinishReason;
use super::usage::Usage;
use crate::error::Diagnostic;

/// Final result of a successfully consumed stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Visible answer. Holds the reasoning text when the answer was blank.
    pub content: String,
    /// Reasoning text, `None` if no reasoning was observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Time from the first reasoning event to finalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_elapsed_ms: Option<u64>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Whether `content` was filled from `reasoning`.
    #[serde(default)]
    pub content_promoted: bool,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// What had accumulated when a stream failed. Never finalized: no promotion,
/// no tool-call parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialAggregate {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// A tool call assembled from its fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub arguments: ToolArguments,
}

/// Tool-call arguments: parsed JSON, or the raw text when parsing failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolArguments {
    Parsed(serde_json::Value),
    Raw(String),
}

impl ToolArguments {
    /// Parse accumulated argument text. Blank text means "no arguments".
    pub fn from_buffer(buffer: &str) -> Result<Self, (Self, serde_json::Error)> {
        if buffer.trim().is_empty() {
            return Ok(Self::Parsed(serde_json::Value::Object(Default::default())));
        }
        match serde_json::from_str(buffer) {
            Ok(value) => Ok(Self::Parsed(value)),
            Err(e) => Err((Self::Raw(buffer.to_string()), e)),
        }
    }

    pub fn parsed(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Parsed(v) => Some(v),
            Self::Raw(_) => None,
        }
    }
}
