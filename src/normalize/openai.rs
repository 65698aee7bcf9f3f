//! OpenAI Chat Completions chunks (and the many APIs that copy them).

use serde::Deserialize;
use tracing::trace;

use super::malformed;
use crate::types::{StreamEvent, ToolCallDelta, Usage};

#[derive(Debug, Default)]
pub(super) struct OpenAiState {
    finish_reason: Option<String>,
    usage: Option<Usage>,
    finish_emitted: bool,
    /// Last full snapshots seen in non-incremental (`message`) mode.
    snapshot_content: String,
    snapshot_reasoning: String,
}

impl OpenAiState {
    pub(super) fn normalize(&mut self, value: &serde_json::Value, out: &mut Vec<StreamEvent>) {
        let chunk = match ChatChunk::deserialize(value) {
            Ok(chunk) => chunk,
            Err(e) => {
                out.push(malformed(format!("unrecognized chat completion chunk: {e}")));
                return;
            }
        };

        if let Some(usage) = chunk.usage {
            self.usage
                .get_or_insert_with(Usage::default)
                .update(&usage.into());
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if self.finish_reason.is_some() {
            trace!("ignoring choice data after finish_reason");
            return;
        }

        if let Some(delta) = choice.delta {
            self.incremental(delta, out);
        } else if let Some(message) = choice.message {
            self.snapshot(message, out);
        }

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }
    }

    pub(super) fn finish(&mut self, out: &mut Vec<StreamEvent>) {
        if self.finish_emitted || (self.finish_reason.is_none() && self.usage.is_none()) {
            return;
        }
        self.finish_emitted = true;
        out.push(StreamEvent::finish(
            self.finish_reason.take(),
            self.usage.take(),
        ));
    }

    fn incremental(&mut self, delta: ChatDelta, out: &mut Vec<StreamEvent>) {
        let reasoning = delta.reasoning_text();
        let content = delta.content.filter(|c| !c.is_empty());

        match (reasoning, content) {
            (Some(reasoning), content) => {
                out.push(StreamEvent::reasoning(reasoning));
                if let Some(content) = content {
                    out.push(StreamEvent::verbatim_text(content));
                }
            }
            (None, Some(content)) => out.push(StreamEvent::text(content)),
            (None, None) => {}
        }

        for (position, call) in delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
            let (name, arguments) = match call.function {
                Some(f) => (f.name, f.arguments.unwrap_or_default()),
                None => (None, String::new()),
            };
            if call.id.is_none() && name.is_none() && arguments.is_empty() {
                continue;
            }
            out.push(StreamEvent::ToolCallDelta(ToolCallDelta {
                index: call
                    .index
                    .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX)),
                id: call.id,
                name,
                arguments_fragment: arguments,
            }));
        }
    }

    fn snapshot(&mut self, message: ChatDelta, out: &mut Vec<StreamEvent>) {
        let reasoning = message.reasoning_text();
        let has_reasoning = reasoning.is_some();

        if let Some(reasoning) = reasoning {
            if let Some(new) = snapshot_delta(&mut self.snapshot_reasoning, reasoning) {
                out.push(StreamEvent::reasoning(new));
            }
        }
        if let Some(content) = message.content.filter(|c| !c.is_empty()) {
            if let Some(new) = snapshot_delta(&mut self.snapshot_content, content) {
                out.push(StreamEvent::TextDelta {
                    text: new,
                    verbatim: has_reasoning,
                });
            }
        }
    }
}

/// New text carried by a full snapshot relative to the previous one.
fn snapshot_delta(seen: &mut String, next: String) -> Option<String> {
    if next == *seen {
        return None;
    }
    let delta = match next.strip_prefix(seen.as_str()) {
        Some(suffix) => suffix.to_string(),
        None => next.clone(),
    };
    *seen = next;
    Some(delta)
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: Option<ChatDelta>,
    #[serde(default)]
    message: Option<ChatDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
    /// DeepSeek, Grok.
    #[serde(default)]
    reasoning_content: Option<serde_json::Value>,
    /// OpenRouter and others.
    #[serde(default)]
    reasoning: Option<serde_json::Value>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}

impl ChatDelta {
    /// The dedicated reasoning field, if present and non-empty.
    fn reasoning_text(&self) -> Option<String> {
        [&self.reasoning_content, &self.reasoning]
            .into_iter()
            .filter_map(|field| field.as_ref().and_then(|v| v.as_str()))
            .find(|text| !text.is_empty())
            .map(str::to_string)
    }
}

#[derive(Deserialize)]
struct ChatToolCall {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChatFunction>,
}

#[derive(Deserialize)]
struct ChatFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: Option<u32>,
}

impl From<ChatUsage> for Usage {
    fn from(u: ChatUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            cache_read_tokens: u.prompt_tokens_details.and_then(|d| d.cached_tokens),
            reasoning_tokens: u.completion_tokens_details.and_then(|d| d.reasoning_tokens),
        }
    }
}
