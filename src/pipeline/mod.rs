//! Pipeline stages for quiz generation.
//!
//! Each submodule implements exactly one transformation step, and none of
//! them performs network I/O except [`input`] when asked to download a URL.
//! The LLM call itself sits behind [`crate::client::CompletionClient`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ prompts ──▶ client ──▶ extract ──▶ validate
//! (path/URL)  (base64)  (messages)   (LLM)     (JSON span)  (Quiz | failure)
//! ```
//!
//! 1. [`input`]    — load a path, URL or data URL into bytes
//! 2. [`encode`]   — size/type checks and base64 wrapping
//! 3. [`extract`]  — find the JSON payload in free-form model text, plus
//!    the incremental decoder used while a reply is still streaming
//! 4. [`validate`] — exact-count and per-question shape checks

pub mod encode;
pub mod extract;
pub mod input;
pub mod validate;
