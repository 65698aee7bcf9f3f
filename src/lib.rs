//! Thoughtline: streaming LLM response decomposition.
//!
//! Turns an incrementally delivered provider stream into three channels:
//! visible answer text, hidden reasoning text, and tool calls. Reasoning may
//! arrive in a dedicated provider field, inline between delimiter tags
//! (`<think>...</think>`) split across arbitrary chunk boundaries, or through
//! a `thinking` pseudo-tool; all three end up in the same place.
//!
//! The pipeline is three synchronous stages driven by one async pull loop:
//!
//! 1. [`normalize::ChunkNormalizer`]: provider fragment → canonical [`types::StreamEvent`]s
//! 2. [`extract::ReasoningExtractor`]: delimiter state machine over text deltas
//! 3. [`aggregate::StreamAggregator`]: cumulative state, progress callback, finalization
//!
//! # Quick Start
//!
//! ```no_run
//! use thoughtline::prelude::*;
//!
//! # async fn example(bytes: futures::stream::BoxStream<'static, std::io::Result<Vec<u8>>>) -> thoughtline::error::Result<()> {
//! let pipeline = StreamPipeline::builder()
//!     .config(TagPreset::Think.config())
//!     .build();
//! let result = pipeline.run_stream(decode_sse(bytes)).await?;
//! println!("answer: {}", result.content);
//! println!("reasoning: {:?}", result.reasoning);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod prelude;
pub mod source;
pub mod stream_transform;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;
