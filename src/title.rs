//! Short quiz titles derived from a filename.

use crate::client::CompletionClient;
use crate::config::QuizConfig;
use crate::error::PipelineFailure;
use crate::prompts;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Title used when the model returns nothing.
pub const FALLBACK_TITLE: &str = "Quiz";

/// Ask the model for a title of at most three words.
///
/// The reply is only trimmed; an empty reply becomes [`FALLBACK_TITLE`].
pub async fn generate_title(
    client: &dyn CompletionClient,
    filename: &str,
    config: &QuizConfig,
    cancel: &CancellationToken,
) -> Result<String, PipelineFailure> {
    let messages = prompts::title_messages(filename);
    let options = config.title_options();

    let reply = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(PipelineFailure::Cancelled),
        reply = client.complete_text(&messages, &options) => reply?,
    };

    let title = clean_title(&reply);
    debug!("Title for '{}': {}", filename, title);
    Ok(title)
}

pub fn clean_title(reply: &str) -> String {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_reply() {
        assert_eq!(clean_title("  Cell Biology Basics \n"), "Cell Biology Basics");
    }

    #[test]
    fn blank_reply_becomes_fallback() {
        assert_eq!(clean_title(""), "Quiz");
        assert_eq!(clean_title(" \n\t"), "Quiz");
    }

    #[test]
    fn quotes_are_kept() {
        assert_eq!(clean_title("\"History 101\""), "\"History 101\"");
    }
}
