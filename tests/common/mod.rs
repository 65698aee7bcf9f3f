//! Shared test helpers: fragment builders, a scripted source, an update recorder.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use thoughtline::aggregate::UpdateCallback;
use thoughtline::error::{Result, ThoughtlineError};
use thoughtline::source::FragmentSource;
use thoughtline::types::RawFragment;

pub fn openai_text(text: &str) -> RawFragment {
    RawFragment::new(json!({ "choices": [{ "index": 0, "delta": { "content": text } }] }))
}

pub fn openai_reasoning(reasoning: &str, content: Option<&str>) -> RawFragment {
    RawFragment::new(json!({
        "choices": [{ "index": 0, "delta": { "reasoning_content": reasoning, "content": content } }]
    }))
}

pub fn openai_tool(index: u32, name: Option<&str>, arguments: &str) -> RawFragment {
    let mut function = json!({ "arguments": arguments });
    if let Some(name) = name {
        function["name"] = json!(name);
    }
    RawFragment::new(json!({
        "choices": [{ "index": 0, "delta": { "tool_calls": [{ "index": index, "function": function }] } }]
    }))
}

pub fn openai_finish(reason: &str) -> RawFragment {
    RawFragment::new(json!({ "choices": [{ "index": 0, "delta": {}, "finish_reason": reason }] }))
}

/// Every character of `text` as its own fragment.
pub fn per_char(text: &str) -> Vec<RawFragment> {
    text.chars().map(|c| openai_text(&c.to_string())).collect()
}

/// One step of a [`ScriptedSource`].
pub enum Step {
    Fragment(RawFragment),
    Fail(String),
    /// Cancel the token, then hand out the fragment.
    CancelThen(CancellationToken, RawFragment),
    /// Sleep (tokio time) before continuing.
    Sleep(Duration),
    /// Signal the notify and never return.
    Hang(Arc<Notify>),
}

/// A [`FragmentSource`] that replays a script and records how it was used.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    pub closed: Arc<AtomicBool>,
    pub pulls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            closed: Arc::new(AtomicBool::new(false)),
            pulls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fragments(fragments: Vec<RawFragment>) -> Self {
        Self::new(fragments.into_iter().map(Step::Fragment).collect())
    }

    /// Handles that stay valid after the source is moved into a pipeline.
    pub fn observers(&self) -> (Arc<AtomicBool>, Arc<AtomicUsize>) {
        (self.closed.clone(), self.pulls.clone())
    }
}

#[async_trait]
impl FragmentSource for ScriptedSource {
    async fn next_fragment(&mut self) -> Option<Result<RawFragment>> {
        assert!(!self.closed.load(Ordering::SeqCst), "pulled after close");
        self.pulls.fetch_add(1, Ordering::SeqCst);
        loop {
            match self.steps.pop_front()? {
                Step::Fragment(fragment) => return Some(Ok(fragment)),
                Step::Fail(message) => return Some(Err(ThoughtlineError::transport(message))),
                Step::CancelThen(token, fragment) => {
                    token.cancel();
                    return Some(Ok(fragment));
                }
                Step::Sleep(duration) => tokio::time::sleep(duration).await,
                Step::Hang(reached) => {
                    reached.notify_one();
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    async fn close(&mut self) {
        assert!(!self.closed.swap(true, Ordering::SeqCst), "closed twice");
    }
}

pub type Updates = Arc<Mutex<Vec<(String, Option<String>)>>>;

/// An update callback that records every notification.
pub fn recorder() -> (UpdateCallback, Updates) {
    let updates: Updates = Arc::default();
    let sink = updates.clone();
    let callback: UpdateCallback = Arc::new(move |content: &str, reasoning: Option<&str>| {
        sink.lock()
            .unwrap()
            .push((content.to_string(), reasoning.map(str::to_string)));
    });
    (callback, updates)
}
