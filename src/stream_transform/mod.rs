//! Lazy stream adapters over fragments and canonical events.
//!
//! The same stages the pipeline drives by hand, exposed as `Stream`
//! combinators for callers that want the event sequence itself rather than
//! an aggregate.

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::config::DelimiterConfig;
use crate::error::Result;
use crate::extract::ReasoningExtractor;
use crate::normalize::{ChunkNormalizer, Dialect};
use crate::source::FragmentStream;
use crate::types::StreamEvent;

/// Stream of canonical events. Ends after the first error.
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// Trait for transforming a stream of canonical events.
pub trait EventTransform: Send + Sync {
    /// Transform the stream.
    fn transform(&self, stream: EventStream) -> EventStream;
}

/// Fragments in, canonical events out.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeTransform {
    dialect: Dialect,
}

impl NormalizeTransform {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn transform(&self, stream: FragmentStream) -> EventStream {
        let mut normalizer = ChunkNormalizer::new(self.dialect);
        let transformed = async_stream::stream! {
            let mut inner = std::pin::pin!(stream);
            let mut failed = false;
            while let Some(item) = inner.next().await {
                match item {
                    Ok(fragment) => {
                        for event in normalizer.normalize(&fragment) {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        failed = true;
                        yield Err(e);
                        break;
                    }
                }
            }

            if !failed {
                for event in normalizer.finish() {
                    yield Ok(event);
                }
            }
        };
        Box::pin(transformed)
    }
}

/// Splits delimited reasoning out of text deltas.
///
/// Each call to [`EventTransform::transform`] gets its own extractor state.
#[derive(Debug, Clone, Default)]
pub struct ReasoningTransform {
    config: DelimiterConfig,
}

impl ReasoningTransform {
    pub fn new(config: DelimiterConfig) -> Self {
        Self { config }
    }
}

impl EventTransform for ReasoningTransform {
    fn transform(&self, stream: EventStream) -> EventStream {
        let mut extractor = ReasoningExtractor::new(self.config.clone());
        let transformed = async_stream::stream! {
            let mut inner = std::pin::pin!(stream);
            let mut failed = false;
            while let Some(item) = inner.next().await {
                match item {
                    Ok(event) => {
                        for event in extractor.process(event) {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        // Held-back text is dropped, not flushed.
                        failed = true;
                        yield Err(e);
                        break;
                    }
                }
            }

            if !failed {
                for event in extractor.finish() {
                    yield Ok(event);
                }
            }
        };
        Box::pin(transformed)
    }
}

/// Stops the stream right after the first `Finish` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopAtFinish;

impl EventTransform for StopAtFinish {
    fn transform(&self, stream: EventStream) -> EventStream {
        let transformed = async_stream::stream! {
            let mut inner = std::pin::pin!(stream);
            while let Some(item) = inner.next().await {
                let done = matches!(&item, Ok(event) if event.is_finish()) || item.is_err();
                yield item;
                if done {
                    break;
                }
            }
        };
        Box::pin(transformed)
    }
}
