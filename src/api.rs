//! JSON boundary handlers.
//!
//! These are the request/response shapes a web front end exchanges with the
//! pipeline. Failures are reported in the payload (`{ "error": "..." }`),
//! not through a status code, so callers must inspect the shape of the
//! reply. The handlers are transport-agnostic: mount them behind any HTTP
//! framework, or call them directly.
//!
//! ```text
//! POST generate   { files: [{name, type, data}], questionCount, difficulty? }
//!              →  [Question; questionCount]  |  { error }
//! POST review     { questions: [Question], userAnswers: [string|null] }
//!              →  { review, recommendations }  |  { error }
//! POST title      "filename.pdf"
//!              →  "Short Title"
//! ```

use crate::client::CompletionClient;
use crate::config::QuizConfig;
use crate::error::PipelineFailure;
use crate::model::{Difficulty, GenerationRequest, Question, Quiz, Review, ReviewRequest};
use crate::pipeline::{encode, input};
use crate::{generate, review, title};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Message shown for any reply the extractor could not parse.
pub const UNPARSABLE_REPLY: &str = "Could not parse OpenAI's response.";

/// One uploaded file as sent by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    #[serde(rename = "type", default)]
    pub media_type: String,
    /// `data:<type>;base64,<payload>` or bare base64.
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuizBody {
    #[serde(default)]
    pub files: Vec<UploadedFile>,
    /// Number or numeric string; anything else means "use the default".
    #[serde(default)]
    pub question_count: Option<Value>,
    #[serde(default)]
    pub difficulty: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewBody {
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub user_answers: Vec<Option<String>>,
}

/// A handler reply: the success payload, or `{ "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply<T> {
    Success(T),
    Failure { error: String },
}

impl<T> Reply<T> {
    fn failed(failure: &PipelineFailure) -> Self {
        Reply::Failure {
            error: error_message(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success(_))
    }
}

/// User-facing text for a failure.
pub fn error_message(failure: &PipelineFailure) -> String {
    match failure {
        PipelineFailure::Extraction { .. } => UNPARSABLE_REPLY.to_string(),
        other => other.to_string(),
    }
}

/// Handle a quiz-generation request: decode the first upload, normalise the
/// count and difficulty, then run the eager pipeline.
pub async fn generate_quiz(
    client: &dyn CompletionClient,
    config: &QuizConfig,
    body: GenerateQuizBody,
    cancel: &CancellationToken,
) -> Reply<Quiz> {
    match generate_inner(client, config, body, cancel).await {
        Ok(quiz) => Reply::Success(quiz),
        Err(e) => {
            warn!("generate request failed: {}", e);
            Reply::failed(&e)
        }
    }
}

async fn generate_inner(
    client: &dyn CompletionClient,
    config: &QuizConfig,
    body: GenerateQuizBody,
    cancel: &CancellationToken,
) -> Result<Quiz, PipelineFailure> {
    let file = body
        .files
        .first()
        .ok_or_else(|| PipelineFailure::invalid_input("no file was uploaded"))?;

    let loaded = input::decode_data_url(&file.name, &file.media_type, &file.data, config.max_document_bytes)?;
    let document = encode::encode_document(&loaded.name, &loaded.media_type, &loaded.bytes, config)?;

    let count = config.clamp_question_count(body.question_count.as_ref().and_then(count_from_value));
    let difficulty = Difficulty::or_default(body.difficulty.as_ref().and_then(Value::as_str));

    let request = GenerationRequest::new(document, count, difficulty)?;
    generate::generate_quiz(client, &request, config, cancel).await
}

/// Handle a review request. Unusable model replies yield the fallback
/// review; only transport-level failures become `{ error }`.
pub async fn review_quiz(
    client: &dyn CompletionClient,
    config: &QuizConfig,
    body: ReviewBody,
    cancel: &CancellationToken,
) -> Reply<Review> {
    let quiz = match Quiz::from_questions(body.questions) {
        Ok(q) => q,
        Err(e) => return Reply::failed(&e),
    };
    let request = ReviewRequest::new(quiz, body.user_answers);

    match review::review_quiz(client, &request, config, cancel).await {
        Ok(review) => Reply::Success(review),
        Err(e) => {
            warn!("review request failed: {}", e);
            Reply::failed(&e)
        }
    }
}

/// Handle a title request. Never fails: any error yields the fallback title.
pub async fn quiz_title(
    client: &dyn CompletionClient,
    config: &QuizConfig,
    filename: &str,
    cancel: &CancellationToken,
) -> String {
    match title::generate_title(client, filename, config, cancel).await {
        Ok(t) => t,
        Err(e) => {
            warn!("title request failed: {}", e);
            title::FALLBACK_TITLE.to_string()
        }
    }
}

fn count_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_uses_camel_case_and_type_rename() {
        let body: GenerateQuizBody = serde_json::from_value(json!({
            "files": [{"name": "a.pdf", "type": "application/pdf", "data": "data:application/pdf;base64,JVBERg=="}],
            "questionCount": "6",
            "difficulty": "hard"
        }))
        .unwrap();
        assert_eq!(body.files[0].media_type, "application/pdf");
        assert_eq!(body.question_count, Some(json!("6")));
    }

    #[test]
    fn review_body_accepts_null_answers() {
        let body: ReviewBody = serde_json::from_value(json!({
            "questions": [],
            "userAnswers": ["a", null]
        }))
        .unwrap();
        assert_eq!(body.user_answers, vec![Some("a".to_string()), None]);
    }

    #[test]
    fn counts_parse_from_numbers_and_strings() {
        assert_eq!(count_from_value(&json!(5)), Some(5.0));
        assert_eq!(count_from_value(&json!(" 7 ")), Some(7.0));
        assert_eq!(count_from_value(&json!("many")), None);
        assert_eq!(count_from_value(&json!(null)), None);
    }

    #[test]
    fn failure_reply_serialises_as_error_object() {
        let reply: Reply<Review> = Reply::failed(&PipelineFailure::extraction("no bracket"));
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"error": "Could not parse OpenAI's response."})
        );
    }

    #[test]
    fn cardinality_message_names_both_counts() {
        let msg = error_message(&PipelineFailure::CardinalityMismatch { expected: 4, actual: 3 });
        assert_eq!(msg, "Expected 4 questions, received 3");
    }
}
