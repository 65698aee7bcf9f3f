//! Streaming types.

use serde::{Deserialize, Serialize};

use super::usage::Usage;
use crate::error::Diagnostic;

/// Canonical, provider-agnostic stream event.
///
/// Produced by the normalizer, rewritten (text only) by the reasoning
/// extractor and consumed by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Visible answer text.
    TextDelta {
        text: String,
        /// Arrived next to a dedicated reasoning field; never delimiter-scanned.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        verbatim: bool,
    },
    /// Hidden reasoning text.
    ReasoningDelta { text: String },
    /// Partial tool-call arguments.
    ToolCallDelta(ToolCallDelta),
    /// Terminal event. At most one per stream, always last.
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// A recoverable problem noticed by an upstream stage.
    Diagnostic(Diagnostic),
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta {
            text: text.into(),
            verbatim: false,
        }
    }

    pub fn verbatim_text(text: impl Into<String>) -> Self {
        Self::TextDelta {
            text: text.into(),
            verbatim: true,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::ReasoningDelta { text: text.into() }
    }

    pub fn finish(reason: Option<String>, usage: Option<Usage>) -> Self {
        Self::Finish { reason, usage }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }
}

/// A fragment of a tool invocation.
///
/// `name` (and `id`, when the provider sends one) appear only on the fragment
/// that introduces the call; later fragments share the same `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments_fragment: String,
}
