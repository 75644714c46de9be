//! The LLM completion capability.
//!
//! Pipelines never talk to a vendor SDK directly; they hold an
//! `Arc<dyn CompletionClient>` and call one of two modes:
//!
//! * [`CompletionClient::complete_text`] — one-shot, returns the whole reply.
//! * [`CompletionClient::complete_streaming`] — a finite, non-restartable
//!   stream of [`CompletionChunk::Partial`] decodings that ends with exactly
//!   one [`CompletionChunk::Final`] carrying the full reply text.
//!
//! Two backends ship with the crate:
//!
//! | Backend                      | Streaming                               |
//! |------------------------------|-----------------------------------------|
//! | [`azure::AzureChatClient`]   | SSE deltas decoded into growing partials |
//! | [`provider::ProviderClient`] | degraded: a single `Final` element       |
//!
//! Tests and embedders can implement the trait with a scripted mock.

pub mod azure;
pub mod provider;

use crate::error::PipelineFailure;
use crate::model::EncodedDocument;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::Serialize;
use std::pin::Pin;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// Body of a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    /// A document attached verbatim; backends decide how to embed it.
    Document(EncodedDocument),
}

/// One message in the sequence sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_document(document: EncodedDocument) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Document(document),
        }
    }

    /// Plain-text rendering used by text-only chat endpoints.
    ///
    /// Documents become `"<KIND> (base64): <payload>"`.
    pub fn render_text(&self) -> String {
        match &self.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Document(doc) => {
                format!("{} (base64): {}", doc.kind_label(), doc.payload())
            }
        }
    }
}

/// Sampling options for one completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Shape of the JSON value the caller expects the reply to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputSchema {
    /// A JSON array (quiz generation).
    Array,
    /// A JSON object (review).
    Object,
}

impl OutputSchema {
    pub fn brackets(&self) -> (char, char) {
        match self {
            OutputSchema::Array => ('[', ']'),
            OutputSchema::Object => ('{', '}'),
        }
    }
}

/// One element of a streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionChunk {
    /// An increasingly-complete decoding of the reply so far.
    Partial(serde_json::Value),
    /// The full reply text; always the last element.
    Final(String),
}

/// A boxed stream of completion chunks.
pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<CompletionChunk, PipelineFailure>> + Send>>;

/// A pluggable LLM backend.
///
/// Implementations surface network, authentication and rate-limit problems
/// as [`PipelineFailure::Transport`] and never retry internally.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send `messages` and wait for the whole reply.
    async fn complete_text(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<String, PipelineFailure>;

    /// Send `messages` and observe the reply as it grows.
    ///
    /// The default implementation cannot decode partial output and yields a
    /// single [`CompletionChunk::Final`] once the whole reply is available.
    async fn complete_streaming(
        &self,
        messages: &[Message],
        schema: OutputSchema,
        options: &RequestOptions,
    ) -> Result<CompletionStream, PipelineFailure> {
        let _ = schema;
        let text = self.complete_text(messages, options).await?;
        Ok(Box::pin(stream::once(async move {
            Ok(CompletionChunk::Final(text))
        })))
    }

    /// Backend name for logs.
    fn name(&self) -> &str;
}
