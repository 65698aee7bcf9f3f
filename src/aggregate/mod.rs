//! Stream aggregation.
//!
//! Folds the canonical event sequence into cumulative answer and reasoning
//! text, reports progress after every event, and applies the end-of-stream
//! policy (tool-call parsing, reasoning timing, content promotion).

mod tool_calls;

pub use tool_calls::THINKING_TOOL;

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::Diagnostic;
use crate::types::{
    AggregateResult, FinishReason, PartialAggregate, StreamEvent, ToolCallResult, Usage,
};
use tool_calls::ToolCallBuffers;

/// Progress callback: `(cumulative_content, cumulative_reasoning)`.
///
/// Reasoning is `None` until the first reasoning text has been observed.
/// Runs on the pipeline's only processing path; keep it short.
pub type UpdateCallback = Arc<dyn Fn(&str, Option<&str>) + Send + Sync>;

/// Accumulates one stream. Not reusable: `finalize` or `into_partial`
/// consumes it.
pub struct StreamAggregator {
    content: String,
    reasoning: Option<String>,
    reasoning_started_at: Option<Instant>,
    tool_buffers: ToolCallBuffers,
    tool_calls: Vec<ToolCallResult>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    finished: bool,
    diagnostics: Vec<Diagnostic>,
    on_update: Option<UpdateCallback>,
}

impl std::fmt::Debug for StreamAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAggregator")
            .field("content_len", &self.content.len())
            .field("reasoning_len", &self.reasoning.as_ref().map(String::len))
            .field("finished", &self.finished)
            .field("diagnostics", &self.diagnostics.len())
            .finish_non_exhaustive()
    }
}

impl Default for StreamAggregator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StreamAggregator {
    pub fn new(on_update: Option<UpdateCallback>) -> Self {
        Self {
            content: String::new(),
            reasoning: None,
            reasoning_started_at: None,
            tool_buffers: ToolCallBuffers::default(),
            tool_calls: Vec::new(),
            finish_reason: None,
            usage: None,
            finished: false,
            diagnostics: Vec::new(),
            on_update,
        }
    }

    /// Fold one event in, then notify the callback.
    ///
    /// Events after the first `Finish` are ignored.
    pub fn apply(&mut self, event: StreamEvent) {
        if self.finished {
            warn!(?event, "event after finish ignored");
            return;
        }
        match event {
            StreamEvent::TextDelta { text, .. } => self.content.push_str(&text),
            StreamEvent::ReasoningDelta { text } => self.push_reasoning(&text),
            StreamEvent::ToolCallDelta(delta) => self.tool_buffers.push(delta),
            StreamEvent::Finish { reason, usage } => {
                self.finished = true;
                self.finish_reason = reason.as_deref().and_then(|raw| {
                    let mapped = FinishReason::from_provider(raw);
                    if mapped.is_none() {
                        debug!(reason = raw, "unmapped finish reason");
                    }
                    mapped
                });
                if usage.is_some() {
                    self.usage = usage;
                }
                self.resolve_tool_calls();
            }
            StreamEvent::Diagnostic(diagnostic) => self.diagnostics.push(diagnostic),
        }
        self.notify();
    }

    /// Current cumulative `(content, reasoning)`.
    pub fn snapshot(&self) -> (&str, Option<&str>) {
        (&self.content, self.reasoning.as_deref())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Apply the end-of-stream policy and produce the result.
    ///
    /// Does not notify: a promoted answer was never received as answer text.
    pub fn finalize(mut self) -> AggregateResult {
        if !self.tool_buffers.is_empty() {
            self.resolve_tool_calls();
        }

        let reasoning_elapsed_ms = self
            .reasoning_started_at
            .map(|started| started.elapsed().as_millis() as u64);

        let mut content = self.content;
        let mut content_promoted = false;
        if let Some(reasoning) = self.reasoning.as_deref() {
            if content.trim().is_empty() && !reasoning.is_empty() {
                debug!("answer is blank; promoting reasoning to content");
                content = reasoning.to_string();
                content_promoted = true;
            }
        }

        AggregateResult {
            content,
            reasoning: self.reasoning,
            reasoning_elapsed_ms,
            tool_calls: self.tool_calls,
            finish_reason: self.finish_reason,
            usage: self.usage,
            content_promoted,
            diagnostics: self.diagnostics,
        }
    }

    /// What had accumulated so far, without finalization.
    pub fn into_partial(self) -> PartialAggregate {
        PartialAggregate {
            content: self.content,
            reasoning: self.reasoning,
            diagnostics: self.diagnostics,
        }
    }

    fn push_reasoning(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.reasoning_started_at.is_none() {
            trace!("first reasoning observed");
            self.reasoning_started_at = Some(Instant::now());
        }
        self.reasoning
            .get_or_insert_with(String::new)
            .push_str(text);
    }

    fn resolve_tool_calls(&mut self) {
        let resolved = self.tool_buffers.resolve();
        for thinking in &resolved.thinking {
            self.push_reasoning(thinking);
        }
        self.tool_calls.extend(resolved.tool_calls);
        self.diagnostics.extend(resolved.diagnostics);
    }

    fn notify(&self) {
        if let Some(callback) = &self.on_update {
            callback(&self.content, self.reasoning.as_deref());
        }
    }
}
