//! Error types for thoughtline.
//!
//! Only transport-level failures and cancellation end a stream early. Everything
//! the pipeline can recover from locally is reported as a [`Diagnostic`] instead.

pub mod diagnostic;

pub use diagnostic::{Diagnostic, DiagnosticKind};

use thiserror::Error;

use crate::types::PartialAggregate;

/// Primary error type for all thoughtline operations.
#[derive(Error, Debug)]
pub enum ThoughtlineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The upstream source failed mid-stream. `partial` holds what had been
    /// accumulated before the failure; it was never finalized.
    #[error("Stream interrupted: {source}")]
    Interrupted {
        #[source]
        source: Box<ThoughtlineError>,
        partial: Box<PartialAggregate>,
    },

    #[error("Stream cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Cancelled,
    Configuration,
    Serialization,
    Io,
    Unknown,
}

impl ThoughtlineError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Wrap an upstream failure together with the partial aggregate.
    pub fn interrupted(source: ThoughtlineError, partial: PartialAggregate) -> Self {
        Self::Interrupted {
            source: Box::new(source),
            partial: Box::new(partial),
        }
    }

    /// Classify this error into a category.
    ///
    /// An interrupted stream is classified by the failure that interrupted it.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Configuration(_) | Self::ConfigParse(_) | Self::InvalidArgument(_) => {
                ErrorCategory::Configuration
            }
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Io,
            Self::Interrupted { source, .. } => source.category(),
        }
    }

    /// The partial aggregate exposed by an interrupted stream, if any.
    pub fn partial(&self) -> Option<&PartialAggregate> {
        match self {
            Self::Interrupted { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// Consume the error, returning its partial aggregate, if any.
    pub fn into_partial(self) -> Option<PartialAggregate> {
        match self {
            Self::Interrupted { partial, .. } => Some(*partial),
            _ => None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ThoughtlineError>;
