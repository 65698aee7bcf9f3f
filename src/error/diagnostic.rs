//! Recoverable conditions reported alongside the stream.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Kind of locally-recovered problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiagnosticKind {
    /// A provider fragment matched no known shape and was skipped.
    MalformedFragment,
    /// The stream ended inside a reasoning block.
    UnterminatedReasoning,
    /// Tool-call arguments were not valid JSON; the raw text was kept.
    ToolArgumentParseFailure,
    /// The provider reported an error in-band.
    ProviderError,
}

/// A diagnostic recorded by one of the pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Diagnostic for a fragment that could not be interpreted.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::MalformedFragment, message)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
