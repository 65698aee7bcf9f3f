//! Convenience re-exports for common use.

pub use crate::aggregate::{StreamAggregator, UpdateCallback};
pub use crate::config::{DelimiterConfig, PipelineConfig, TagPreset};
pub use crate::error::{Diagnostic, DiagnosticKind, Result, ThoughtlineError};
pub use crate::extract::ReasoningExtractor;
pub use crate::normalize::{ChunkNormalizer, Dialect};
pub use crate::pipeline::StreamPipeline;
pub use crate::source::{decode_json_lines, decode_sse, FragmentSource, StreamSource};
pub use crate::types::{
    AggregateResult, FinishReason, PartialAggregate, RawFragment, StreamEvent, ToolArguments,
    ToolCallResult, Usage,
};
