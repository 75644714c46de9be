//! Eager (whole-reply) quiz generation.
//!
//! [`generate_quiz`] waits for the complete model reply, then extracts and
//! validates it. Use [`crate::stream::generate_quiz_stream`] instead when
//! the caller wants to show questions as they arrive.
//!
//! Either way the result is all-or-nothing: a [`Quiz`] of exactly the
//! requested length, or a [`PipelineFailure`] naming the stage that failed.
//! Nothing is retried; resubmitting is a fresh call with no shared state.

use crate::client::CompletionClient;
use crate::config::QuizConfig;
use crate::error::PipelineFailure;
use crate::model::{GenerationRequest, Quiz};
use crate::pipeline::{extract, validate};
use crate::prompts;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Generate a quiz from a document.
///
/// # Errors
/// - `transport` — the completion call failed
/// - `extraction` — the reply held no parseable JSON array
/// - `cardinality-mismatch` / `schema-mismatch` — the array was wrong
/// - `cancelled` — `cancel` fired before the reply arrived
pub async fn generate_quiz(
    client: &dyn CompletionClient,
    request: &GenerationRequest,
    config: &QuizConfig,
    cancel: &CancellationToken,
) -> Result<Quiz, PipelineFailure> {
    let start = Instant::now();
    let expected = request.question_count();
    info!(
        "Generating {} {} questions from '{}' via {}",
        expected,
        request.difficulty(),
        request.document().name(),
        client.name()
    );

    let messages = prompts::quiz_messages(request);
    let options = config.quiz_options();

    let text = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(PipelineFailure::Cancelled),
        reply = client.complete_text(&messages, &options) => reply?,
    };

    let result = finish_quiz(&text, expected);
    match &result {
        Ok(quiz) => info!(
            "Quiz ready: {} questions in {}ms",
            quiz.len(),
            start.elapsed().as_millis()
        ),
        Err(e) => warn!("Quiz generation failed at {}: {}", e.stage(), e),
    }
    result
}

/// Extract and validate a complete reply.
pub fn finish_quiz(text: &str, expected: usize) -> Result<Quiz, PipelineFailure> {
    debug!("Raw model reply: {}", text);
    let value = extract::extract_array(text)?;
    validate::validate_quiz(value, expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO: &str = r#"Sure! [{"question":"Q1","options":["a","b","c","d"],"answer":"a"},
        {"question":"Q2","options":["a","b","c","d"],"answer":"d"}]"#;

    #[test]
    fn finish_quiz_accepts_prose_wrapped_array() {
        let quiz = finish_quiz(TWO, 2).unwrap();
        assert_eq!(quiz.questions()[1].answer, "d");
    }

    #[test]
    fn finish_quiz_reports_count() {
        let err = finish_quiz(TWO, 3).unwrap_err();
        assert_eq!(err, PipelineFailure::CardinalityMismatch { expected: 3, actual: 2 });
    }

    #[test]
    fn finish_quiz_without_array_is_extraction_failure() {
        let err = finish_quiz("I cannot help with that", 4).unwrap_err();
        assert_eq!(err.stage(), crate::error::FailureStage::Extraction);
    }
}
