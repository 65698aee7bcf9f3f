//! Chunk normalization: provider-shaped fragments in, canonical events out.
//!
//! Field-name and shape translation only. The normalizer never buffers text
//! and never looks for delimiters; it only remembers per-stream bookkeeping
//! (finish reason, usage, snapshot progress) that providers spread across
//! several fragments.

mod anthropic;
mod openai;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

use crate::error::Diagnostic;
use crate::types::{RawFragment, StreamEvent};

/// Wire dialect of the incoming fragments.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Dialect {
    /// Decide per fragment from its shape.
    #[default]
    Auto,
    /// OpenAI Chat Completions chunks and compatible APIs
    /// (DeepSeek, Grok, OpenRouter, Together, ...).
    OpenaiChat,
    /// Anthropic Messages streaming events.
    Anthropic,
}

/// Translates raw provider fragments into [`StreamEvent`]s, preserving order.
#[derive(Debug, Default)]
pub struct ChunkNormalizer {
    dialect: Dialect,
    openai: openai::OpenAiState,
    anthropic: anthropic::AnthropicState,
}

impl ChunkNormalizer {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Default::default()
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Translate one fragment into zero or more events.
    ///
    /// Never fails: fragments that match no known shape produce a
    /// [`Diagnostic`] event instead.
    pub fn normalize(&mut self, fragment: &RawFragment) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        let value = fragment.as_value();

        let Some(object) = value.as_object() else {
            out.push(malformed(format!("expected a JSON object, got {}", preview(value))));
            return out;
        };

        let openai_shaped = match self.dialect {
            Dialect::OpenaiChat => true,
            Dialect::Anthropic => false,
            Dialect::Auto => {
                if object.contains_key("choices") {
                    true
                } else if object.get("type").is_some_and(|t| t.is_string()) {
                    false
                } else {
                    out.push(malformed(format!("unrecognized fragment shape: {}", preview(value))));
                    return out;
                }
            }
        };

        if openai_shaped {
            self.openai.normalize(value, &mut out);
        } else {
            self.anthropic.normalize(value, &mut out);
        }
        out
    }

    /// Called once the source is exhausted. Emits the terminal `Finish` event
    /// if the provider announced one that has not been emitted yet.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        self.openai.finish(&mut out);
        self.anthropic.finish(&mut out);
        out
    }
}

/// Build a malformed-fragment diagnostic event, logging it.
pub(crate) fn malformed(message: String) -> StreamEvent {
    warn!(%message, "skipping malformed fragment");
    StreamEvent::Diagnostic(Diagnostic::malformed(message))
}

/// Short, char-boundary-safe rendering of a payload for diagnostics.
pub(crate) fn preview(value: &serde_json::Value) -> String {
    const MAX: usize = 80;
    let rendered = value.to_string();
    if rendered.len() <= MAX {
        return rendered;
    }
    let mut end = MAX;
    while end > 0 && !rendered.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &rendered[..end])
}
