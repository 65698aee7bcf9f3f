//! The end-to-end pipeline: source → normalizer → extractor → aggregator.
//!
//! One pipeline run serves one response. All stage state lives on the stack
//! of [`StreamPipeline::run`]; the pipeline value itself is only
//! configuration and can be reused or cloned for concurrent runs.

use bon::Builder;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::aggregate::{StreamAggregator, UpdateCallback};
use crate::config::{DelimiterConfig, PipelineConfig};
use crate::error::{Result, ThoughtlineError};
use crate::extract::ReasoningExtractor;
use crate::normalize::{ChunkNormalizer, Dialect};
use crate::source::{FragmentSource, FragmentStream, StreamSource};
use crate::stream_transform::{
    EventStream, EventTransform, NormalizeTransform, ReasoningTransform, StopAtFinish,
};
use crate::types::{AggregateResult, StreamEvent};

/// Streaming response decomposition.
///
/// ```no_run
/// use thoughtline::prelude::*;
/// use thoughtline::source::from_fragments;
///
/// # async fn example(fragments: Vec<RawFragment>) -> thoughtline::error::Result<()> {
/// let pipeline = StreamPipeline::builder()
///     .config(TagPreset::Think.config())
///     .on_update(std::sync::Arc::new(|content: &str, reasoning: Option<&str>| {
///         println!("{} chars / {:?}", content.len(), reasoning.map(str::len));
///     }))
///     .build();
/// let result = pipeline.run_stream(from_fragments(fragments)).await?;
/// println!("{}", result.content);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Builder)]
pub struct StreamPipeline {
    #[builder(default)]
    config: DelimiterConfig,
    #[builder(default)]
    dialect: Dialect,
    cancellation: Option<CancellationToken>,
    on_update: Option<UpdateCallback>,
}

impl std::fmt::Debug for StreamPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPipeline")
            .field("config", &self.config)
            .field("dialect", &self.dialect)
            .field("cancellable", &self.cancellation.is_some())
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}

impl Default for StreamPipeline {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl StreamPipeline {
    /// A pipeline for the given dialect and delimiters, without callback or
    /// cancellation.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::builder()
            .config(config.delimiters.clone())
            .dialect(config.dialect)
            .build()
    }

    pub fn config(&self) -> &DelimiterConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Consume `source` to completion.
    ///
    /// Stops after the first `Finish` event or when the source is exhausted.
    /// The source is closed on every exit path. Upstream failures come back
    /// as [`ThoughtlineError::Interrupted`] carrying the partial aggregate;
    /// cancellation as [`ThoughtlineError::Cancelled`], with no further
    /// callbacks.
    pub async fn run<S>(&self, mut source: S) -> Result<AggregateResult>
    where
        S: FragmentSource,
    {
        let session = Uuid::new_v4();
        debug!(%session, dialect = %self.dialect, "stream started");

        let outcome = match self.config.validate() {
            Ok(()) => self.drive(&mut source, session).await,
            Err(e) => Err(e),
        };
        source.close().await;

        match &outcome {
            Ok(result) => debug!(
                %session,
                content_len = result.content.len(),
                reasoning_len = result.reasoning.as_ref().map(String::len),
                tool_calls = result.tool_calls.len(),
                diagnostics = result.diagnostics.len(),
                "stream finished"
            ),
            Err(e) => debug!(%session, error = %e, "stream ended early"),
        }
        outcome
    }

    /// [`run`](Self::run) over a fragment stream.
    pub async fn run_stream(&self, stream: FragmentStream) -> Result<AggregateResult> {
        self.run(StreamSource::new(stream)).await
    }

    /// The canonical event sequence for `stream`, without aggregation.
    ///
    /// Lazy: nothing is pulled until the returned stream is polled. Ends
    /// after `Finish` or after the first error. Cancellation ends it with a
    /// final [`ThoughtlineError::Cancelled`]; held-back text is dropped.
    pub fn events(&self, stream: FragmentStream) -> EventStream {
        let events = NormalizeTransform::new(self.dialect).transform(stream);
        let events = ReasoningTransform::new(self.config.clone()).transform(events);
        let events = StopAtFinish.transform(events);
        let Some(cancel) = self.cancellation.clone() else {
            return events;
        };

        let cancellable = async_stream::stream! {
            let mut inner = events;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = inner.next() => Some(next),
                };
                match next {
                    Some(Some(item)) => yield item,
                    Some(None) => break,
                    None => {
                        debug!("event stream cancelled");
                        yield Err(ThoughtlineError::Cancelled);
                        break;
                    }
                }
            }
        };
        Box::pin(cancellable)
    }

    async fn drive<S>(&self, source: &mut S, session: Uuid) -> Result<AggregateResult>
    where
        S: FragmentSource,
    {
        let cancel = self.cancellation.clone().unwrap_or_default();
        let mut normalizer = ChunkNormalizer::new(self.dialect);
        let mut extractor = ReasoningExtractor::new(self.config.clone());
        let mut aggregator = StreamAggregator::new(self.on_update.clone());
        let mut fragments = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%session, fragments, "stream cancelled");
                    return Err(ThoughtlineError::Cancelled);
                }
                next = source.next_fragment() => next,
            };

            let fragment = match next {
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => {
                    warn!(%session, fragments, error = %e, "upstream failed mid-stream");
                    return Err(ThoughtlineError::interrupted(e, aggregator.into_partial()));
                }
                None => break,
            };
            fragments += 1;
            trace!(%session, fragments, "fragment received");

            for event in normalizer.normalize(&fragment) {
                apply(&cancel, &mut extractor, &mut aggregator, event)?;
            }
            if aggregator.is_finished() {
                break;
            }
        }

        if !aggregator.is_finished() {
            trace!(%session, "source exhausted without finish");
            for event in normalizer.finish() {
                apply(&cancel, &mut extractor, &mut aggregator, event)?;
            }
            for event in extractor.finish() {
                if cancel.is_cancelled() {
                    return Err(ThoughtlineError::Cancelled);
                }
                aggregator.apply(event);
            }
        }

        Ok(aggregator.finalize())
    }
}

/// Push one normalized event through the extractor into the aggregator.
fn apply(
    cancel: &CancellationToken,
    extractor: &mut ReasoningExtractor,
    aggregator: &mut StreamAggregator,
    event: StreamEvent,
) -> Result<()> {
    for event in extractor.process(event) {
        if cancel.is_cancelled() {
            return Err(ThoughtlineError::Cancelled);
        }
        trace!(?event, "event");
        aggregator.apply(event);
    }
    Ok(())
}
