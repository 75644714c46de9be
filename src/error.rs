//! Failure types for the quizforge pipeline.
//!
//! Every stage of the pipeline reports problems through a single value type,
//! [`PipelineFailure`]. It is a plain enum rather than an opaque error so it
//! can travel inside stream items, be cloned into progress callbacks and be
//! serialised at the boundary as `{ "error": "..." }`.
//!
//! The variants follow the stage that failed:
//!
//! | Stage                  | Raised by                                  |
//! |------------------------|--------------------------------------------|
//! | `configuration`        | credentials / config builders              |
//! | `invalid-input`        | document loading and encoding              |
//! | `transport`            | [`crate::client::CompletionClient`] impls  |
//! | `extraction`           | [`crate::pipeline::extract`]               |
//! | `cardinality-mismatch` | [`crate::pipeline::validate`]              |
//! | `schema-mismatch`      | [`crate::pipeline::validate`]              |
//! | `cancelled`            | the caller's cancellation token            |
//!
//! Nothing in the library panics on bad model output; it always ends up in
//! one of these variants.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A failure at one stage of quiz generation, review or titling.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum PipelineFailure {
    // ── Before any network I/O ────────────────────────────────────────────
    /// Credentials or configuration are missing or invalid.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The supplied document was rejected (too large, wrong type, unreadable).
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    // ── LLM capability ────────────────────────────────────────────────────
    /// Network, authentication or rate-limit failure at the LLM endpoint.
    #[error("LLM transport error{}: {message}", http_status(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    // ── Reply handling ────────────────────────────────────────────────────
    /// No parseable JSON span was found in the model reply.
    #[error("Could not extract JSON from the model reply: {reason}")]
    Extraction { reason: String },

    /// The reply held the wrong number of questions.
    #[error("Expected {expected} questions, received {actual}")]
    CardinalityMismatch { expected: usize, actual: usize },

    /// An element of the reply does not have the required shape.
    #[error("Schema mismatch in {}: `{field}` {detail}", item_label(.index))]
    SchemaMismatch {
        index: Option<usize>,
        field: String,
        detail: String,
    },

    // ── Caller ────────────────────────────────────────────────────────────
    /// The caller's cancellation signal fired before a terminal state.
    #[error("Generation was cancelled before it completed")]
    Cancelled,
}

fn http_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

fn item_label(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("question {}", i + 1),
        None => "reply object".to_string(),
    }
}

impl PipelineFailure {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn extraction(reason: impl Into<String>) -> Self {
        Self::Extraction {
            reason: reason.into(),
        }
    }

    pub fn schema(index: Option<usize>, field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            index,
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// The stage this failure belongs to.
    pub fn stage(&self) -> FailureStage {
        match self {
            Self::Configuration { .. } => FailureStage::Configuration,
            Self::InvalidInput { .. } => FailureStage::InvalidInput,
            Self::Transport { .. } => FailureStage::Transport,
            Self::Extraction { .. } => FailureStage::Extraction,
            Self::CardinalityMismatch { .. } => FailureStage::CardinalityMismatch,
            Self::SchemaMismatch { .. } => FailureStage::SchemaMismatch,
            Self::Cancelled => FailureStage::Cancelled,
        }
    }
}

impl From<reqwest::Error> for PipelineFailure {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

/// Tag naming the stage of a [`PipelineFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStage {
    Configuration,
    InvalidInput,
    Transport,
    Extraction,
    CardinalityMismatch,
    SchemaMismatch,
    Cancelled,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::InvalidInput => "invalid-input",
            Self::Transport => "transport",
            Self::Extraction => "extraction",
            Self::CardinalityMismatch => "cardinality-mismatch",
            Self::SchemaMismatch => "schema-mismatch",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
