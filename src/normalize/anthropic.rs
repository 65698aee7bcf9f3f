//! Anthropic Messages API streaming events.

use serde_json::Value;
use tracing::{trace, warn};

use super::{malformed, preview};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::types::{StreamEvent, ToolCallDelta, Usage};

#[derive(Debug, Default)]
pub(super) struct AnthropicState {
    stop_reason: Option<String>,
    usage: Option<Usage>,
    /// A `message_delta` announced the end; `message_stop` not seen yet.
    stopping: bool,
    finish_emitted: bool,
}

impl AnthropicState {
    pub(super) fn normalize(&mut self, event: &Value, out: &mut Vec<StreamEvent>) {
        let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
        match event_type {
            "message_start" => {
                if let Some(usage) = event.get("message").and_then(|m| m.get("usage")) {
                    self.record_usage(usage);
                }
            }
            "content_block_start" => self.block_start(event, out),
            "content_block_delta" => self.block_delta(event, out),
            "message_delta" => {
                if let Some(reason) = event
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(|r| r.as_str())
                {
                    self.stop_reason = Some(reason.to_string());
                    self.stopping = true;
                }
                if let Some(usage) = event.get("usage") {
                    self.record_usage(usage);
                }
            }
            "message_stop" => self.emit_finish(out),
            "content_block_stop" | "ping" => {}
            "error" => {
                let message = event
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown provider error")
                    .to_string();
                warn!(%message, "provider reported an in-band error");
                out.push(StreamEvent::Diagnostic(Diagnostic::new(
                    DiagnosticKind::ProviderError,
                    message,
                )));
            }
            _ => out.push(malformed(format!(
                "unknown anthropic event type: {}",
                preview(event)
            ))),
        }
    }

    pub(super) fn finish(&mut self, out: &mut Vec<StreamEvent>) {
        if self.stopping {
            self.emit_finish(out);
        }
    }

    fn emit_finish(&mut self, out: &mut Vec<StreamEvent>) {
        if self.finish_emitted {
            trace!("duplicate message_stop ignored");
            return;
        }
        self.finish_emitted = true;
        self.stopping = false;
        out.push(StreamEvent::finish(self.stop_reason.take(), self.usage.take()));
    }

    fn block_start(&mut self, event: &Value, out: &mut Vec<StreamEvent>) {
        let (Some(index), Some(block)) = (block_index(event), event.get("content_block")) else {
            out.push(malformed(format!(
                "content_block_start without index or block: {}",
                preview(event)
            )));
            return;
        };
        match block.get("type").and_then(|t| t.as_str()).unwrap_or("") {
            "tool_use" | "server_tool_use" => {
                out.push(StreamEvent::ToolCallDelta(ToolCallDelta {
                    index,
                    id: block.get("id").and_then(|v| v.as_str()).map(str::to_string),
                    name: block.get("name").and_then(|v| v.as_str()).map(str::to_string),
                    arguments_fragment: String::new(),
                }));
            }
            "text" => {
                if let Some(text) = non_empty_str(block, "text") {
                    out.push(StreamEvent::text(text));
                }
            }
            "thinking" => {
                if let Some(thinking) = non_empty_str(block, "thinking") {
                    out.push(StreamEvent::reasoning(thinking));
                }
            }
            _ => {}
        }
    }

    fn block_delta(&mut self, event: &Value, out: &mut Vec<StreamEvent>) {
        let (Some(index), Some(delta)) = (block_index(event), event.get("delta")) else {
            out.push(malformed(format!(
                "content_block_delta without index or delta: {}",
                preview(event)
            )));
            return;
        };
        match delta.get("type").and_then(|t| t.as_str()).unwrap_or("") {
            "text_delta" => {
                if let Some(text) = non_empty_str(delta, "text") {
                    out.push(StreamEvent::text(text));
                }
            }
            "thinking_delta" => {
                if let Some(thinking) = non_empty_str(delta, "thinking") {
                    out.push(StreamEvent::reasoning(thinking));
                }
            }
            "input_json_delta" => {
                if let Some(json) = non_empty_str(delta, "partial_json") {
                    out.push(StreamEvent::ToolCallDelta(ToolCallDelta {
                        index,
                        id: None,
                        name: None,
                        arguments_fragment: json.to_string(),
                    }));
                }
            }
            "signature_delta" | "citations_delta" => {}
            other => out.push(malformed(format!("unknown content delta type '{other}'"))),
        }
    }

    fn record_usage(&mut self, usage: &Value) {
        let field = |name: &str| {
            usage
                .get(name)
                .and_then(|v| v.as_u64())
                .and_then(|v| u32::try_from(v).ok())
        };
        let update = Usage {
            input_tokens: field("input_tokens").unwrap_or(0),
            output_tokens: field("output_tokens").unwrap_or(0),
            total_tokens: 0,
            cache_read_tokens: field("cache_read_input_tokens"),
            reasoning_tokens: None,
        };
        self.usage
            .get_or_insert_with(Usage::default)
            .update(&update);
    }
}

fn block_index(event: &Value) -> Option<u32> {
    event
        .get("index")
        .and_then(|i| i.as_u64())
        .and_then(|i| u32::try_from(i).ok())
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}
