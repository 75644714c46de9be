//! Personalised review of a completed quiz.
//!
//! Unlike quiz generation this is best-effort: a reply that cannot be
//! extracted or validated becomes [`Review::fallback`] instead of an error.
//! Failures that happen before any reply exists (transport, configuration,
//! cancellation) still propagate.

use crate::client::CompletionClient;
use crate::config::QuizConfig;
use crate::error::PipelineFailure;
use crate::model::{Review, ReviewRequest};
use crate::pipeline::{extract, validate};
use crate::prompts;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ask the model to review the user's answers.
pub async fn review_quiz(
    client: &dyn CompletionClient,
    request: &ReviewRequest,
    config: &QuizConfig,
    cancel: &CancellationToken,
) -> Result<Review, PipelineFailure> {
    info!(
        "Reviewing quiz: {}/{} correct, via {}",
        request.score(),
        request.questions().len(),
        client.name()
    );

    let messages = prompts::review_messages(request);
    let options = config.review_options();

    let text = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(PipelineFailure::Cancelled),
        reply = client.complete_text(&messages, &options) => reply?,
    };

    Ok(parse_review(&text))
}

/// Turn a raw reply into a [`Review`], falling back when it is unusable.
pub fn parse_review(text: &str) -> Review {
    debug!("Raw review reply: {}", text);
    match extract::extract_object(text).and_then(validate::validate_review) {
        Ok(review) => review,
        Err(e) => {
            warn!("Review reply unusable ({}); using fallback", e);
            Review::fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_object() {
        let r = parse_review(
            "Here you go:\n{\"review\": \"Solid work.\", \"recommendations\": \"Revise chapter 2.\"}",
        );
        assert_eq!(r.review, "Solid work.");
        assert_eq!(r.recommendations, "Revise chapter 2.");
    }

    #[test]
    fn garbled_reply_falls_back() {
        assert_eq!(parse_review("lorem ipsum {not json"), Review::fallback());
    }

    #[test]
    fn empty_field_falls_back() {
        assert_eq!(
            parse_review(r#"{"review": "  ", "recommendations": "x"}"#),
            Review::fallback()
        );
    }

    #[test]
    fn fallback_text_is_fixed() {
        let r = Review::fallback();
        assert_eq!(r.review, "Could not parse OpenAI's response.");
        assert_eq!(r.recommendations, "Try again.");
    }
}
