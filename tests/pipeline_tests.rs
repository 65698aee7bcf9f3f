//! End-to-end tests for the stream pipeline.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use common::*;
use thoughtline::error::{DiagnosticKind, ErrorCategory, ThoughtlineError};
use thoughtline::prelude::*;
use thoughtline::source::from_fragments;

const SAMPLE: &str = "Hello <think>because X</think>World";

fn think_pipeline() -> StreamPipeline {
    StreamPipeline::builder()
        .config(DelimiterConfig::default())
        .build()
}

#[tokio::test]
async fn sample_yields_content_and_reasoning_in_one_fragment() {
    let result = think_pipeline()
        .run_stream(from_fragments(vec![openai_text(SAMPLE)]))
        .await
        .unwrap();
    assert_eq!(result.content, "HelloWorld");
    assert_eq!(result.reasoning.as_deref(), Some("because X"));
    assert!(!result.content_promoted);
}

#[tokio::test]
async fn sample_is_split_invariant_down_to_single_characters() {
    let result = think_pipeline()
        .run_stream(from_fragments(per_char(SAMPLE)))
        .await
        .unwrap();
    assert_eq!(result.content, "HelloWorld");
    assert_eq!(result.reasoning.as_deref(), Some("because X"));

    // Every two- and three-way split, including `<th` / `ink>`.
    let boundaries: Vec<usize> = SAMPLE.char_indices().map(|(i, _)| i).skip(1).collect();
    for (n, &a) in boundaries.iter().enumerate() {
        for &b in &boundaries[n..] {
            let mut parts = vec![&SAMPLE[..a]];
            if b > a {
                parts.push(&SAMPLE[a..b]);
            }
            parts.push(&SAMPLE[b..]);
            let fragments: Vec<RawFragment> = parts.into_iter().map(openai_text).collect();
            let result = think_pipeline()
                .run_stream(from_fragments(fragments))
                .await
                .unwrap();
            assert_eq!(
                (result.content.as_str(), result.reasoning.as_deref()),
                ("HelloWorld", Some("because X")),
                "split at {a}/{b}"
            );
        }
    }
}

#[tokio::test]
async fn no_delimiters_pass_text_through() {
    let text = "plain answer with a < and a </think> but no opening tag";
    let result = think_pipeline()
        .run_stream(from_fragments(per_char(text)))
        .await
        .unwrap();
    assert_eq!(result.content, text);
    assert_eq!(result.reasoning, None);
    assert_eq!(result.reasoning_elapsed_ms, None);

    let disabled = StreamPipeline::builder()
        .config(DelimiterConfig::disabled())
        .build();
    let result = disabled
        .run_stream(from_fragments(vec![openai_text(SAMPLE)]))
        .await
        .unwrap();
    assert_eq!(result.content, SAMPLE);
    assert_eq!(result.reasoning, None);
}

#[tokio::test]
async fn reasoning_only_response_is_promoted() {
    let result = think_pipeline()
        .run_stream(from_fragments(per_char("<think>all of it</think>")))
        .await
        .unwrap();
    assert_eq!(result.reasoning.as_deref(), Some("all of it"));
    assert_eq!(result.content, "all of it");
    assert!(result.content_promoted);
}

#[tokio::test]
async fn thinking_tool_is_a_reasoning_channel() {
    let result = think_pipeline()
        .run_stream(from_fragments(vec![
            openai_tool(0, Some("thinking"), "{\"thin"),
            openai_tool(0, None, "king\":\"ab"),
            openai_tool(0, None, "c\"}"),
            openai_finish("tool_calls"),
        ]))
        .await
        .unwrap();
    assert!(result.reasoning.as_deref().unwrap().contains("abc"));
    assert!(result.tool_calls.is_empty());
    assert!(result.reasoning_elapsed_ms.is_some());
}

#[tokio::test]
async fn thinking_tool_with_plain_text_arguments_is_reasoning() {
    let result = think_pipeline()
        .run_stream(from_fragments(vec![
            openai_tool(0, Some("thinking"), "plain "),
            openai_tool(0, None, "reasoning"),
            openai_text("Done."),
            openai_finish("stop"),
        ]))
        .await
        .unwrap();
    assert_eq!(result.reasoning.as_deref(), Some("plain reasoning"));
    assert_eq!(result.content, "Done.");
    assert!(result.tool_calls.is_empty());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::ToolArgumentParseFailure));
}

#[tokio::test]
async fn regular_tool_calls_are_assembled() {
    let result = think_pipeline()
        .run_stream(from_fragments(vec![
            openai_text("Let me check."),
            openai_tool(0, Some("get_weather"), "{\"city\":"),
            openai_tool(0, None, "\"Paris\"}"),
            openai_tool(1, Some("broken"), "{\"x\":"),
            openai_finish("tool_calls"),
        ]))
        .await
        .unwrap();
    assert_eq!(result.content, "Let me check.");
    assert_eq!(result.tool_calls.len(), 2);
    assert_eq!(result.tool_calls[0].name, "get_weather");
    assert_eq!(
        result.tool_calls[0].arguments,
        ToolArguments::Parsed(json!({"city": "Paris"}))
    );
    assert_eq!(result.tool_calls[1].arguments, ToolArguments::Raw("{\"x\":".into()));
    assert_eq!(result.finish_reason, Some(FinishReason::ToolCalls));
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::ToolArgumentParseFailure));
}

#[tokio::test]
async fn unterminated_reasoning_falls_back_with_diagnostic() {
    let result = think_pipeline()
        .run_stream(from_fragments(per_char("<think>partial")))
        .await
        .unwrap();
    assert_eq!(result.reasoning.as_deref(), Some("partial"));
    assert_eq!(result.content, "partial");
    assert!(result.content_promoted);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::UnterminatedReasoning));
}

#[tokio::test]
async fn separator_after_closing_tag_is_discarded() {
    let pipeline = StreamPipeline::builder()
        .config(DelimiterConfig::default().with_separator("\n\n"))
        .build();
    let result = pipeline
        .run_stream(from_fragments(per_char("<think>plan</think>\n\nAnswer\n\nmore")))
        .await
        .unwrap();
    assert_eq!(result.content, "Answer\n\nmore");
    assert_eq!(result.reasoning.as_deref(), Some("plan"));
}

#[tokio::test]
async fn response_header_preset_splits_sections() {
    let pipeline = StreamPipeline::builder()
        .config(TagPreset::ResponseHeader.config())
        .build();
    let result = pipeline
        .run_stream(from_fragments(per_char("###Thinking\nstep one\n###Response\nDone.")))
        .await
        .unwrap();
    assert_eq!(result.reasoning.as_deref(), Some("\nstep one\n"));
    assert_eq!(result.content, "\nDone.");
}

#[tokio::test]
async fn dedicated_reasoning_field_skips_delimiter_scanning() {
    let result = think_pipeline()
        .run_stream(from_fragments(vec![
            openai_reasoning("native ", None),
            openai_reasoning("thoughts", Some("<think>literal")),
            openai_text(" tail"),
            openai_finish("stop"),
        ]))
        .await
        .unwrap();
    assert_eq!(result.reasoning.as_deref(), Some("native thoughts"));
    assert_eq!(result.content, "<think>literal tail");
    assert!(result.diagnostics.is_empty());
}

#[tokio::test]
async fn malformed_fragments_are_reported_and_skipped() {
    let result = think_pipeline()
        .run_stream(from_fragments(vec![
            openai_text("a"),
            RawFragment::parse("not json"),
            RawFragment::new(json!({ "unexpected": true })),
            openai_text("b"),
        ]))
        .await
        .unwrap();
    assert_eq!(result.content, "ab");
    assert_eq!(
        result
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::MalformedFragment)
            .count(),
        2
    );
}

#[tokio::test]
async fn updates_grow_monotonically() {
    let (callback, updates) = recorder();
    let pipeline = StreamPipeline::builder()
        .config(DelimiterConfig::default())
        .on_update(callback)
        .build();
    let mut fragments = per_char("Intro <think>step 1, step 2</think>Answer: 42");
    fragments.push(openai_reasoning("late native reasoning", None));
    fragments.push(openai_finish("stop"));

    let result = pipeline.run_stream(from_fragments(fragments)).await.unwrap();
    let updates = updates.lock().unwrap();
    assert!(!updates.is_empty());

    let mut previous = (String::new(), None::<String>);
    for (content, reasoning) in updates.iter() {
        assert!(content.starts_with(&previous.0), "content shrank: {content:?}");
        match (&previous.1, reasoning) {
            (Some(before), Some(now)) => assert!(now.starts_with(before.as_str())),
            (Some(_), None) => panic!("reasoning disappeared"),
            _ => {}
        }
        previous = (content.clone(), reasoning.clone());
    }
    assert_eq!(previous.0, result.content);
    assert_eq!(previous.1, result.reasoning);
}

#[tokio::test]
async fn cancellation_mid_fragment_is_silent() {
    let token = CancellationToken::new();
    let (callback, updates) = recorder();
    let source = ScriptedSource::new(vec![
        Step::Fragment(openai_text("Hello")),
        Step::CancelThen(token.clone(), openai_text(" world")),
        Step::Fragment(openai_finish("stop")),
    ]);
    let (closed, pulls) = source.observers();

    let pipeline = StreamPipeline::builder()
        .cancellation(token)
        .on_update(callback)
        .build();
    let err = pipeline.run(source).await.unwrap_err();

    assert!(matches!(err, ThoughtlineError::Cancelled));
    assert_eq!(err.category(), ErrorCategory::Cancelled);
    assert_eq!(
        *updates.lock().unwrap(),
        vec![("Hello".to_string(), None)]
    );
    assert!(closed.load(Ordering::SeqCst));
    assert_eq!(pulls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancellation_while_waiting_for_upstream() {
    let token = CancellationToken::new();
    let (callback, updates) = recorder();
    let reached = Arc::new(Notify::new());
    let source = ScriptedSource::new(vec![
        Step::Fragment(openai_text("<think>pending</thi")),
        Step::Hang(reached.clone()),
    ]);
    let (closed, _) = source.observers();

    let pipeline = StreamPipeline::builder()
        .cancellation(token.clone())
        .on_update(callback)
        .build();
    let (outcome, ()) = tokio::join!(pipeline.run(source), async {
        reached.notified().await;
        token.cancel();
    });

    assert!(matches!(outcome, Err(ThoughtlineError::Cancelled)));
    // The held-back reasoning is discarded, not flushed.
    assert_eq!(
        *updates.lock().unwrap(),
        vec![(String::new(), Some("pending".to_string()))]
    );
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn upstream_failure_exposes_partial_aggregate() {
    let source = ScriptedSource::new(vec![
        Step::Fragment(openai_text("<think>half a thought</think>Half an ans")),
        Step::Fail("connection reset".into()),
        Step::Fragment(openai_text("never read")),
    ]);
    let (closed, pulls) = source.observers();

    let err = think_pipeline().run(source).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Transport);
    let partial = err.partial().expect("partial aggregate");
    assert_eq!(partial.content, "Half an ans");
    assert_eq!(partial.reasoning.as_deref(), Some("half a thought"));
    assert!(err.to_string().contains("connection reset"));
    assert!(closed.load(Ordering::SeqCst));
    assert_eq!(pulls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stops_pulling_after_finish() {
    let source = ScriptedSource::new(vec![
        Step::Fragment(RawFragment::new(json!({
            "type": "content_block_delta", "index": 0,
            "delta": { "type": "text_delta", "text": "done" }
        }))),
        Step::Fragment(RawFragment::new(json!({
            "type": "message_delta", "delta": { "stop_reason": "end_turn" }
        }))),
        Step::Fragment(RawFragment::new(json!({ "type": "message_stop" }))),
        Step::Fail("must not be read".into()),
    ]);
    let (closed, pulls) = source.observers();

    let result = think_pipeline().run(source).await.unwrap();
    assert_eq!(result.content, "done");
    assert_eq!(result.finish_reason, Some(FinishReason::Stop));
    assert_eq!(pulls.load(Ordering::SeqCst), 3);
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn reasoning_elapsed_is_measured_from_first_reasoning() {
    let source = ScriptedSource::new(vec![
        Step::Fragment(openai_text("intro ")),
        Step::Sleep(Duration::from_millis(100)),
        Step::Fragment(openai_reasoning("thinking", None)),
        Step::Sleep(Duration::from_millis(250)),
        Step::Fragment(openai_text("answer")),
        Step::Fragment(openai_finish("stop")),
    ]);

    let result = think_pipeline().run(source).await.unwrap();
    assert_eq!(result.reasoning_elapsed_ms, Some(250));
}

#[tokio::test]
async fn invalid_config_is_rejected_and_source_closed() {
    let source = ScriptedSource::fragments(vec![openai_text("x")]);
    let (closed, pulls) = source.observers();
    let pipeline = StreamPipeline::builder()
        .config(
            DelimiterConfig::builder()
                .opening_tag("")
                .closing_tag("</think>")
                .build(),
        )
        .build();

    let err = pipeline.run(source).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(closed.load(Ordering::SeqCst));
    assert_eq!(pulls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn events_expose_the_canonical_sequence() {
    let events: Vec<StreamEvent> = think_pipeline()
        .events(from_fragments(vec![
            openai_text("Hi <thi"),
            openai_text("nk>r</think>!"),
            openai_finish("stop"),
            openai_text("after finish"),
        ]))
        .map(|e| e.unwrap())
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            StreamEvent::text("Hi"),
            StreamEvent::reasoning("r"),
            StreamEvent::text("!"),
            StreamEvent::finish(Some("stop".into()), None),
        ]
    );
}

#[tokio::test]
async fn events_stop_on_cancellation() {
    let token = CancellationToken::new();
    let pipeline = StreamPipeline::builder().cancellation(token.clone()).build();
    token.cancel();
    let events: Vec<_> = pipeline
        .events(from_fragments(vec![openai_text("a"), openai_text("b")]))
        .collect()
        .await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Err(ThoughtlineError::Cancelled)));
}

#[tokio::test]
async fn events_cancelled_midway_end_with_an_error() {
    let token = CancellationToken::new();
    let pipeline = StreamPipeline::builder().cancellation(token.clone()).build();
    let mut events = pipeline.events(from_fragments(vec![
        openai_text("first"),
        openai_text(" second"),
        openai_finish("stop"),
    ]));

    assert_eq!(events.next().await.unwrap().unwrap(), StreamEvent::text("first"));
    token.cancel();
    assert!(matches!(events.next().await, Some(Err(ThoughtlineError::Cancelled))));
    assert!(events.next().await.is_none());
}

#[tokio::test]
async fn uncancelled_event_stream_ends_without_error() {
    let pipeline = StreamPipeline::builder()
        .cancellation(CancellationToken::new())
        .build();
    let events: Vec<_> = pipeline
        .events(from_fragments(vec![openai_text("a"), openai_finish("stop")]))
        .collect()
        .await;
    assert!(events.iter().all(|e| e.is_ok()));
    assert!(events.last().unwrap().as_ref().unwrap().is_finish());
}

#[tokio::test]
async fn pipeline_from_config_uses_dialect_and_delimiters() {
    let config = PipelineConfig::from_toml_str(
        r#"
        dialect = "openai_chat"
        preset = "thought"
        "#,
    )
    .unwrap();
    let pipeline = StreamPipeline::from_config(&config);
    assert_eq!(pipeline.dialect(), Dialect::OpenaiChat);

    let result = pipeline
        .run_stream(from_fragments(vec![openai_text("<thought>x</thought>y")]))
        .await
        .unwrap();
    assert_eq!(result.content, "y");
    assert_eq!(result.reasoning.as_deref(), Some("x"));
}
