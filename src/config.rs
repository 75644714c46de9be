//! Configuration for quiz generation and for the LLM endpoint.
//!
//! Two pieces of configuration exist and they have different lifetimes:
//!
//! * [`QuizConfig`] — generation knobs (token budgets, temperature, document
//!   limits). Built once via [`QuizConfigBuilder`] and shared read-only by
//!   every pipeline call.
//!
//! * [`AzureCredentials`] — API key, endpoint and deployment for the raw
//!   chat-completions backend. Read once at startup (usually from the
//!   environment) and handed to [`crate::client::azure::AzureChatClient`].
//!   Missing values fail with [`PipelineFailure::Configuration`] before any
//!   request is attempted.

use crate::client::RequestOptions;
use crate::error::PipelineFailure;
use crate::model::MAX_QUESTION_COUNT;
use crate::progress::ProgressCallback;
use std::fmt;

/// Default upload ceiling: 5 MiB.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

/// Azure OpenAI REST API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "2025-01-01-preview";

/// Configuration shared by the quiz, review and title pipelines.
///
/// # Example
/// ```rust
/// use quizforge::QuizConfig;
///
/// let config = QuizConfig::builder()
///     .temperature(0.3)
///     .quiz_max_tokens(4096)
///     .build()
///     .unwrap();
/// assert_eq!(config.default_question_count, 4);
/// ```
#[derive(Clone)]
pub struct QuizConfig {
    /// Sampling temperature for every completion. Default: 0.7.
    ///
    /// Question writing benefits from some variety; the extraction and
    /// validation stages catch replies that wander off format.
    pub temperature: f32,

    /// Token budget for the quiz reply. Default: 2048.
    ///
    /// Twenty questions with four options each fit comfortably; a budget that
    /// is too small truncates the JSON array and fails extraction.
    pub quiz_max_tokens: usize,

    /// Token budget for the review reply. Default: 512.
    pub review_max_tokens: usize,

    /// Token budget for the title reply. Default: 10.
    pub title_max_tokens: usize,

    /// Question count used when the caller gives none (or a non-positive one). Default: 4.
    pub default_question_count: usize,

    /// Largest question count accepted at the boundary. Default: 20.
    pub max_question_count: usize,

    /// Largest accepted document, in raw bytes. Default: 5 MiB.
    pub max_document_bytes: usize,

    /// Media types accepted for upload. Default: `application/pdf`.
    pub accepted_media_types: Vec<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional observer for streaming progress.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            quiz_max_tokens: 2048,
            review_max_tokens: 512,
            title_max_tokens: 10,
            default_question_count: 4,
            max_question_count: MAX_QUESTION_COUNT,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            accepted_media_types: vec!["application/pdf".to_string()],
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for QuizConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizConfig")
            .field("temperature", &self.temperature)
            .field("quiz_max_tokens", &self.quiz_max_tokens)
            .field("review_max_tokens", &self.review_max_tokens)
            .field("title_max_tokens", &self.title_max_tokens)
            .field("default_question_count", &self.default_question_count)
            .field("max_question_count", &self.max_question_count)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("accepted_media_types", &self.accepted_media_types)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn QuizProgressCallback>"),
            )
            .finish()
    }
}

impl QuizConfig {
    /// Create a new builder for `QuizConfig`.
    pub fn builder() -> QuizConfigBuilder {
        QuizConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn quiz_options(&self) -> RequestOptions {
        RequestOptions {
            temperature: self.temperature,
            max_tokens: self.quiz_max_tokens,
        }
    }

    pub fn review_options(&self) -> RequestOptions {
        RequestOptions {
            temperature: self.temperature,
            max_tokens: self.review_max_tokens,
        }
    }

    pub fn title_options(&self) -> RequestOptions {
        RequestOptions {
            temperature: self.temperature,
            max_tokens: self.title_max_tokens,
        }
    }

    /// Normalise a caller-supplied question count: absent or below one
    /// becomes the default, anything above the maximum is clamped.
    pub fn clamp_question_count(&self, requested: Option<f64>) -> usize {
        match requested {
            Some(n) if n.is_finite() && n >= 1.0 => (n as usize).min(self.max_question_count),
            _ => self.default_question_count,
        }
    }
}

/// Builder for [`QuizConfig`].
#[derive(Debug)]
pub struct QuizConfigBuilder {
    config: QuizConfig,
}

impl QuizConfigBuilder {
    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn quiz_max_tokens(mut self, n: usize) -> Self {
        self.config.quiz_max_tokens = n;
        self
    }

    pub fn review_max_tokens(mut self, n: usize) -> Self {
        self.config.review_max_tokens = n;
        self
    }

    pub fn title_max_tokens(mut self, n: usize) -> Self {
        self.config.title_max_tokens = n;
        self
    }

    pub fn default_question_count(mut self, n: usize) -> Self {
        self.config.default_question_count = n;
        self
    }

    pub fn max_question_count(mut self, n: usize) -> Self {
        self.config.max_question_count = n.clamp(1, MAX_QUESTION_COUNT);
        self
    }

    pub fn max_document_bytes(mut self, n: usize) -> Self {
        self.config.max_document_bytes = n;
        self
    }

    pub fn accept_media_type(mut self, media_type: impl Into<String>) -> Self {
        let media_type = media_type.into().to_ascii_lowercase();
        if !self.config.accepted_media_types.contains(&media_type) {
            self.config.accepted_media_types.push(media_type);
        }
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<QuizConfig, PipelineFailure> {
        let c = &self.config;
        if c.default_question_count == 0 || c.default_question_count > c.max_question_count {
            return Err(PipelineFailure::configuration(format!(
                "default question count must be 1–{}, got {}",
                c.max_question_count, c.default_question_count
            )));
        }
        if c.quiz_max_tokens == 0 || c.review_max_tokens == 0 || c.title_max_tokens == 0 {
            return Err(PipelineFailure::configuration("token budgets must be ≥ 1"));
        }
        if c.max_document_bytes == 0 {
            return Err(PipelineFailure::configuration("max document size must be ≥ 1 byte"));
        }
        Ok(self.config)
    }
}

// ── Credentials ──────────────────────────────────────────────────────────

/// Connection settings for an Azure OpenAI chat deployment.
#[derive(Clone, PartialEq, Eq)]
pub struct AzureCredentials {
    pub api_key: String,
    pub endpoint: String,
    pub deployment_id: String,
    pub api_version: String,
}

impl AzureCredentials {
    pub const API_KEY_VAR: &'static str = "AZURE_OPENAI_API_KEY";
    pub const ENDPOINT_VAR: &'static str = "AZURE_OPENAI_ENDPOINT";
    pub const DEPLOYMENT_VAR: &'static str = "AZURE_OPENAI_DEPLOYMENT_ID";
    pub const API_VERSION_VAR: &'static str = "AZURE_OPENAI_API_VERSION";

    /// Build credentials, rejecting blank values.
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        deployment_id: impl Into<String>,
    ) -> Result<Self, PipelineFailure> {
        let creds = Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            deployment_id: deployment_id.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
        };
        creds.validate()?;
        Ok(creds)
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Read credentials from `AZURE_OPENAI_*` environment variables.
    pub fn from_env() -> Result<Self, PipelineFailure> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineFailure>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    PipelineFailure::configuration(format!("missing environment variable {key}"))
                })
        };

        let creds = Self {
            api_key: required(Self::API_KEY_VAR)?,
            endpoint: required(Self::ENDPOINT_VAR)?,
            deployment_id: required(Self::DEPLOYMENT_VAR)?,
            api_version: lookup(Self::API_VERSION_VAR)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Fail fast on blank values.
    pub fn validate(&self) -> Result<(), PipelineFailure> {
        for (name, value) in [
            ("API key", &self.api_key),
            ("endpoint", &self.endpoint),
            ("deployment id", &self.deployment_id),
            ("API version", &self.api_version),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineFailure::configuration(format!(
                    "Azure OpenAI {name} is empty"
                )));
            }
        }
        if !self.endpoint.starts_with("https://") && !self.endpoint.starts_with("http://") {
            return Err(PipelineFailure::configuration(format!(
                "Azure OpenAI endpoint '{}' is not an HTTP(S) URL",
                self.endpoint
            )));
        }
        Ok(())
    }

    /// Chat-completions URL for the configured deployment.
    pub fn chat_completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment_id,
            self.api_version
        )
    }
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("deployment_id", &self.deployment_id)
            .field("api_version", &self.api_version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_upload_limits() {
        let c = QuizConfig::default();
        assert_eq!(c.max_document_bytes, 5 * 1024 * 1024);
        assert_eq!(c.accepted_media_types, vec!["application/pdf"]);
        assert_eq!(c.quiz_options().max_tokens, 2048);
        assert_eq!(c.review_options().max_tokens, 512);
        assert_eq!(c.title_options().max_tokens, 10);
    }

    #[test]
    fn clamp_question_count() {
        let c = QuizConfig::default();
        assert_eq!(c.clamp_question_count(None), 4);
        assert_eq!(c.clamp_question_count(Some(0.0)), 4);
        assert_eq!(c.clamp_question_count(Some(-3.0)), 4);
        assert_eq!(c.clamp_question_count(Some(7.0)), 7);
        assert_eq!(c.clamp_question_count(Some(50.0)), 20);
        assert_eq!(c.clamp_question_count(Some(f64::NAN)), 4);
    }

    #[test]
    fn builder_rejects_bad_default_count() {
        let err = QuizConfig::builder()
            .max_question_count(5)
            .default_question_count(6)
            .build()
            .unwrap_err();
        assert_eq!(err.stage(), crate::error::FailureStage::Configuration);
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = QuizConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_adds_media_types_once() {
        let c = QuizConfig::builder()
            .accept_media_type("Text/Plain")
            .accept_media_type("text/plain")
            .build()
            .unwrap();
        assert_eq!(c.accepted_media_types, vec!["application/pdf", "text/plain"]);
    }

    #[test]
    fn api_version_override_reaches_url() {
        let creds = AzureCredentials::new("k", "https://x.openai.azure.com", "d")
            .unwrap()
            .with_api_version("2024-10-21");
        assert!(creds.chat_completions_url().ends_with("?api-version=2024-10-21"));
    }

    #[test]
    fn credentials_missing_var_is_configuration_error() {
        let err = AzureCredentials::from_lookup(lookup(&[
            ("AZURE_OPENAI_API_KEY", "k"),
            ("AZURE_OPENAI_ENDPOINT", "https://x.openai.azure.com"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("AZURE_OPENAI_DEPLOYMENT_ID"), "got: {err}");
    }

    #[test]
    fn credentials_blank_var_is_missing() {
        let err = AzureCredentials::from_lookup(lookup(&[
            ("AZURE_OPENAI_API_KEY", "   "),
            ("AZURE_OPENAI_ENDPOINT", "https://x.openai.azure.com"),
            ("AZURE_OPENAI_DEPLOYMENT_ID", "gpt"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("AZURE_OPENAI_API_KEY"));
    }

    #[test]
    fn credentials_build_url_and_redact_key() {
        let creds = AzureCredentials::from_lookup(lookup(&[
            ("AZURE_OPENAI_API_KEY", "sk-secret"),
            ("AZURE_OPENAI_ENDPOINT", "https://x.openai.azure.com/"),
            ("AZURE_OPENAI_DEPLOYMENT_ID", "gpt-4o"),
        ]))
        .unwrap();
        assert_eq!(
            creds.chat_completions_url(),
            "https://x.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2025-01-01-preview"
        );
        assert!(!format!("{creds:?}").contains("sk-secret"));
    }

    #[test]
    fn credentials_reject_non_url_endpoint() {
        assert!(AzureCredentials::new("k", "x.openai.azure.com", "d").is_err());
    }
}
