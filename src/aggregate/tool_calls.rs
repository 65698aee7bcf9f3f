//! Tool-call argument buffers.

use std::collections::BTreeMap;

use tracing::warn;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::types::{ToolArguments, ToolCallDelta, ToolCallResult};

/// Name of the pseudo-tool some providers use to deliver reasoning.
pub const THINKING_TOOL: &str = "thinking";

#[derive(Debug, Default)]
struct ToolCallBuffer {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Per-index accumulation of tool-call fragments. Nothing is parsed until
/// [`ToolCallBuffers::resolve`].
#[derive(Debug, Default)]
pub(super) struct ToolCallBuffers {
    calls: BTreeMap<u32, ToolCallBuffer>,
}

/// Outcome of resolving the buffered calls.
#[derive(Debug, Default)]
pub(super) struct Resolved {
    pub tool_calls: Vec<ToolCallResult>,
    /// Text delivered through the thinking pseudo-tool, in index order.
    pub thinking: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ToolCallBuffers {
    pub(super) fn push(&mut self, delta: ToolCallDelta) {
        let buffer = self.calls.entry(delta.index).or_default();
        if delta.id.is_some() {
            buffer.id = delta.id;
        }
        if delta.name.is_some() {
            buffer.name = delta.name;
        }
        buffer.arguments.push_str(&delta.arguments_fragment);
    }

    pub(super) fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Parse every buffer. Unparseable arguments are kept raw and reported.
    pub(super) fn resolve(&mut self) -> Resolved {
        let mut resolved = Resolved::default();
        for (index, buffer) in std::mem::take(&mut self.calls) {
            let name = buffer.name.unwrap_or_default();
            let arguments = match ToolArguments::from_buffer(&buffer.arguments) {
                Ok(arguments) => arguments,
                Err((raw, e)) => {
                    let message = format!("arguments of tool call {index} ('{name}') are not valid JSON: {e}");
                    warn!(index, tool = %name, error = %e, "keeping raw tool-call arguments");
                    resolved.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::ToolArgumentParseFailure,
                        message,
                    ));
                    raw
                }
            };

            if name == THINKING_TOOL {
                if let Some(thinking) = thinking_text(&arguments) {
                    resolved.thinking.push(thinking);
                    continue;
                }
            }

            resolved.tool_calls.push(ToolCallResult {
                index,
                id: buffer.id,
                name,
                arguments,
            });
        }
        resolved
    }
}

/// The reasoning carried by a thinking pseudo-tool call: its `thinking`
/// field, or the whole payload when it is not JSON.
fn thinking_text(arguments: &ToolArguments) -> Option<String> {
    let parsed = match arguments {
        ToolArguments::Parsed(parsed) => parsed,
        ToolArguments::Raw(raw) if raw.trim().is_empty() => return None,
        ToolArguments::Raw(raw) => return Some(raw.clone()),
    };
    match parsed.get(THINKING_TOOL)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
