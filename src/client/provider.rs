//! Generic backend over any `edgequake-llm` provider.
//!
//! Lets the quiz pipeline run against OpenAI, Anthropic, Gemini, Ollama or
//! anything else `edgequake_llm::ProviderFactory` can build. The provider API
//! has no structured streaming, so this backend keeps the trait's default
//! [`CompletionClient::complete_streaming`]: one terminal `Final` element.

use super::{CompletionClient, Message, RequestOptions, Role};
use crate::error::PipelineFailure;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// [`CompletionClient`] backed by an `edgequake_llm::LLMProvider`.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderClient {
    /// Wrap a pre-built provider.
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            label: "provider".to_string(),
        }
    }

    /// Build a named provider (`"openai"`, `"anthropic"`, …) with `model`.
    ///
    /// The provider reads its own API key variable; a missing key is a
    /// configuration error, raised here rather than on first use.
    pub fn from_name(provider_name: &str, model: Option<&str>) -> Result<Self, PipelineFailure> {
        let model = model.unwrap_or(DEFAULT_MODEL);
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            PipelineFailure::configuration(format!("LLM provider '{provider_name}': {e}"))
        })?;
        Ok(Self {
            provider,
            label: format!("{provider_name}/{model}"),
        })
    }

    /// Auto-detect a provider from the environment's API key variables.
    pub fn from_env() -> Result<Self, PipelineFailure> {
        let (provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
            PipelineFailure::configuration(format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {e}"
            ))
        })?;
        Ok(Self::new(provider))
    }
}

/// Convert pipeline messages into provider chat messages.
fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| {
            // Documents travel as "<KIND> (base64): ..." text.
            let text = m.render_text();
            match m.role {
                Role::System => ChatMessage::system(text.as_str()),
                Role::User => ChatMessage::user(text.as_str()),
            }
        })
        .collect()
}

fn build_options(options: &RequestOptions) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(options.temperature),
        max_tokens: Some(options.max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl CompletionClient for ProviderClient {
    async fn complete_text(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<String, PipelineFailure> {
        let chat = to_chat_messages(messages);
        let opts = build_options(options);

        let response = self
            .provider
            .chat(&chat, Some(&opts))
            .await
            .map_err(|e| PipelineFailure::transport(None, e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_copies_budget() {
        let opts = build_options(&RequestOptions {
            temperature: 0.7,
            max_tokens: 2048,
        });
        assert_eq!(opts.temperature, Some(0.7));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn converts_every_message() {
        let msgs = [Message::system("persona"), Message::user("do it")];
        assert_eq!(to_chat_messages(&msgs).len(), 2);
    }
}
