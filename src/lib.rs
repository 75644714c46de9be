//! # quizforge
//!
//! Turn a document into a multiple-choice quiz with a Large Language Model,
//! then review the user's answers.
//!
//! ## Why this crate?
//!
//! Model output is unstructured text. Asking for "a JSON array of 4
//! questions" usually works, but sometimes the reply is wrapped in prose,
//! has three questions, or has an answer that is not one of the options.
//! This crate treats the model as an untrusted source: every reply is
//! scraped, counted and shape-checked, and the caller gets either a quiz
//! that satisfies every invariant or a [`PipelineFailure`] naming the stage
//! that broke.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     local file, URL or base64 data URL
//!  ├─ 2. Encode    size/type checks → base64 EncodedDocument
//!  ├─ 3. Prompt    persona + count/difficulty instruction + document
//!  ├─ 4. Complete  CompletionClient (Azure chat completions / edgequake-llm)
//!  ├─ 5. Extract   first '[' … last ']' → JSON
//!  └─ 6. Validate  exact count, 4 options, answer ∈ options → Quiz
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quizforge::{generate_quiz, load_document, AzureChatClient, Difficulty, GenerationRequest, QuizConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads AZURE_OPENAI_API_KEY / AZURE_OPENAI_ENDPOINT / AZURE_OPENAI_DEPLOYMENT_ID
//!     let client = AzureChatClient::from_env()?;
//!     let config = QuizConfig::default();
//!     let document = load_document("lecture.pdf", &config).await?;
//!     let request = GenerationRequest::new(document, 4, Difficulty::Medium)?;
//!     let quiz = generate_quiz(&client, &request, &config, &CancellationToken::new()).await?;
//!     println!("{}", serde_json::to_string_pretty(&quiz)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `quizforge` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! quizforge = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod generate;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod review;
pub mod stream;
pub mod title;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::azure::AzureChatClient;
pub use client::provider::ProviderClient;
pub use client::{CompletionChunk, CompletionClient, CompletionStream, Message, OutputSchema, RequestOptions};
pub use config::{AzureCredentials, QuizConfig, QuizConfigBuilder};
pub use error::{FailureStage, PipelineFailure};
pub use generate::generate_quiz;
pub use model::{Difficulty, EncodedDocument, GenerationRequest, PartialQuiz, Question, Quiz, Review, ReviewRequest};
pub use pipeline::encode::encode_document;
pub use pipeline::input::load_document;
pub use progress::{NoopProgressCallback, ProgressCallback, QuizProgressCallback};
pub use review::review_quiz;
pub use stream::{generate_quiz_stream, QuizEvent, QuizStream};
pub use title::generate_title;
