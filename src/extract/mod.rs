//! Delimiter-based reasoning extraction.
//!
//! Re-splits plain text deltas into answer text and reasoning text using an
//! opening/closing tag pair, for providers that inline their chain of thought
//! (`<think>...</think>`). Works on arbitrarily fragmented input: a tag may
//! be split across any number of deltas, down to one character each.
//!
//! At every step the pending buffer holds the longest suffix of the input
//! that could still grow into the tag being looked for; everything before it
//! is emitted immediately. Output therefore never depends on where the input
//! was split, and latency is bounded by the tag length.
//!
//! Whitespace directly in front of an opening tag belongs to the tag and is
//! dropped with it (`"Hello <think>..."` keeps `"Hello"`), up to
//! [`WHITESPACE_BEFORE_TAG`] bytes.

use strum::Display;
use tracing::{debug, warn};

use crate::config::DelimiterConfig;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::types::StreamEvent;

/// Most ASCII whitespace bytes absorbed in front of an opening tag.
pub const WHITESPACE_BEFORE_TAG: usize = 8;

/// Extractor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ExtractorMode {
    /// Answer text; looking for the opening tag.
    Scanning,
    /// Reasoning text; looking for the closing tag.
    InReasoning,
    /// Closing tag seen; discarding the separator if it follows.
    AfterClosing,
    /// Identity transform. Terminal.
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Text,
    Reasoning,
}

/// Streaming tag splitter. Owns all of its state; one per stream.
#[derive(Debug, Clone)]
pub struct ReasoningExtractor {
    config: DelimiterConfig,
    mode: ExtractorMode,
    pending: String,
}

impl ReasoningExtractor {
    /// An enabled config with an empty tag cannot match anything sensibly;
    /// such an extractor passes text through unchanged.
    pub fn new(config: DelimiterConfig) -> Self {
        let mode = if !config.enabled {
            ExtractorMode::Passthrough
        } else if let Err(e) = config.validate() {
            warn!(error = %e, "reasoning extraction disabled");
            ExtractorMode::Passthrough
        } else {
            ExtractorMode::Scanning
        };
        Self {
            config,
            mode,
            pending: String::new(),
        }
    }

    pub fn mode(&self) -> ExtractorMode {
        self.mode
    }

    /// Bytes held back because they may be the start of a delimiter.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Upper bound on `pending().len()`.
    pub fn max_pending(&self) -> usize {
        let opening = self.config.opening_tag.len().saturating_sub(1) + WHITESPACE_BEFORE_TAG;
        let closing = self.config.closing_tag.len().saturating_sub(1);
        let separator = self.config.separator.len().saturating_sub(1);
        opening.max(closing).max(separator)
    }

    /// Process one event. Only non-verbatim text deltas are rewritten; a
    /// `Finish` event first flushes whatever is pending.
    pub fn process(&mut self, event: StreamEvent) -> Vec<StreamEvent> {
        if self.mode == ExtractorMode::Passthrough && self.pending.is_empty() {
            return vec![event];
        }
        match event {
            StreamEvent::TextDelta {
                text,
                verbatim: false,
            } => self.push_text(&text),
            StreamEvent::TextDelta {
                text,
                verbatim: true,
            } => {
                let mut out = Emitter::default();
                self.flush_pending(&mut out);
                let mut events = out.into_events();
                events.push(StreamEvent::verbatim_text(text));
                events
            }
            StreamEvent::Finish { .. } => {
                let mut events = self.finish();
                events.push(event);
                events
            }
            other => vec![other],
        }
    }

    /// Flush at end of stream. Safe to call more than once.
    ///
    /// A stream that ends inside a reasoning block keeps everything after the
    /// opening tag as reasoning and reports an unterminated-reasoning
    /// diagnostic.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let pending = std::mem::take(&mut self.pending);
        let mut out = Emitter::default();
        match self.mode {
            ExtractorMode::Scanning | ExtractorMode::Passthrough => {
                out.push(Channel::Text, &pending);
            }
            ExtractorMode::AfterClosing => {
                // An incomplete separator is ordinary text.
                out.push(Channel::Text, &pending);
                self.mode = ExtractorMode::Scanning;
            }
            ExtractorMode::InReasoning => {
                out.push(Channel::Reasoning, &pending);
                self.mode = ExtractorMode::Passthrough;
                let message = format!(
                    "stream ended inside a reasoning block (no closing {:?})",
                    self.config.closing_tag
                );
                warn!(%message, "unterminated reasoning");
                out.events.push(StreamEvent::Diagnostic(Diagnostic::new(
                    DiagnosticKind::UnterminatedReasoning,
                    message,
                )));
            }
        }
        out.into_events()
    }

    fn push_text(&mut self, text: &str) -> Vec<StreamEvent> {
        let mut out = Emitter::default();
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.push_str(text);
        let mut rest = buffer.as_str();

        loop {
            match self.mode {
                ExtractorMode::Scanning => {
                    let tag = self.config.opening_tag.as_str();
                    if let Some(pos) = rest.find(tag) {
                        let before = &rest[..pos];
                        out.push(Channel::Text, &before[..pos - trailing_whitespace(before)]);
                        rest = &rest[pos + tag.len()..];
                        debug!("reasoning block opened");
                        self.mode = ExtractorMode::InReasoning;
                    } else {
                        let head = rest.len() - partial_tag_len(rest, tag);
                        let split = head - trailing_whitespace(&rest[..head]);
                        out.push(Channel::Text, &rest[..split]);
                        self.pending = rest[split..].to_string();
                        break;
                    }
                }
                ExtractorMode::InReasoning => {
                    let tag = self.config.closing_tag.as_str();
                    if let Some(pos) = rest.find(tag) {
                        out.push(Channel::Reasoning, &rest[..pos]);
                        rest = &rest[pos + tag.len()..];
                        debug!("reasoning block closed");
                        self.mode = ExtractorMode::AfterClosing;
                    } else {
                        let split = rest.len() - partial_tag_len(rest, tag);
                        out.push(Channel::Reasoning, &rest[..split]);
                        self.pending = rest[split..].to_string();
                        break;
                    }
                }
                ExtractorMode::AfterClosing => {
                    let separator = self.config.separator.as_str();
                    if let Some(after) = rest.strip_prefix(separator) {
                        rest = after;
                        self.mode = ExtractorMode::Scanning;
                    } else if separator.starts_with(rest) {
                        self.pending = rest.to_string();
                        break;
                    } else {
                        self.mode = ExtractorMode::Scanning;
                    }
                }
                ExtractorMode::Passthrough => {
                    out.push(Channel::Text, rest);
                    break;
                }
            }
        }

        debug_assert!(self.pending.len() <= self.max_pending());
        out.into_events()
    }

    fn flush_pending(&mut self, out: &mut Emitter) {
        let pending = std::mem::take(&mut self.pending);
        match self.mode {
            ExtractorMode::InReasoning => out.push(Channel::Reasoning, &pending),
            ExtractorMode::AfterClosing => {
                out.push(Channel::Text, &pending);
                self.mode = ExtractorMode::Scanning;
            }
            ExtractorMode::Scanning | ExtractorMode::Passthrough => {
                out.push(Channel::Text, &pending)
            }
        }
    }
}

/// Split a complete (non-streamed) text in one go.
///
/// Returns `(content, reasoning)`; reasoning is `None` when no block was found.
pub fn split_text(config: &DelimiterConfig, text: &str) -> (String, Option<String>) {
    let mut extractor = ReasoningExtractor::new(config.clone());
    let mut events = extractor.push_text(text);
    events.extend(extractor.finish());

    let mut content = String::new();
    let mut reasoning: Option<String> = None;
    for event in events {
        match event {
            StreamEvent::TextDelta { text, .. } => content.push_str(&text),
            StreamEvent::ReasoningDelta { text } => {
                reasoning.get_or_insert_with(String::new).push_str(&text)
            }
            _ => {}
        }
    }
    (content, reasoning)
}

/// Number of trailing ASCII whitespace bytes, capped at
/// [`WHITESPACE_BEFORE_TAG`].
fn trailing_whitespace(text: &str) -> usize {
    text.bytes()
        .rev()
        .take(WHITESPACE_BEFORE_TAG)
        .take_while(u8::is_ascii_whitespace)
        .count()
}

/// Length of the longest proper prefix of `tag` that `haystack` ends with.
///
/// Only prefixes ending on a char boundary count, so the split point in
/// `haystack` is always a char boundary too.
fn partial_tag_len(haystack: &str, tag: &str) -> usize {
    let max = tag.len().saturating_sub(1).min(haystack.len());
    (1..=max)
        .rev()
        .find(|&k| tag.is_char_boundary(k) && haystack.ends_with(&tag[..k]))
        .unwrap_or(0)
}

/// Collects output, merging adjacent pieces of the same channel.
#[derive(Default)]
struct Emitter {
    events: Vec<StreamEvent>,
}

impl Emitter {
    fn push(&mut self, channel: Channel, text: &str) {
        if text.is_empty() {
            return;
        }
        match (self.events.last_mut(), channel) {
            (
                Some(StreamEvent::TextDelta {
                    text: last,
                    verbatim: false,
                }),
                Channel::Text,
            )
            | (Some(StreamEvent::ReasoningDelta { text: last }), Channel::Reasoning) => {
                last.push_str(text)
            }
            _ => self.events.push(match channel {
                Channel::Text => StreamEvent::text(text),
                Channel::Reasoning => StreamEvent::reasoning(text),
            }),
        }
    }

    fn into_events(self) -> Vec<StreamEvent> {
        self.events
    }
}
