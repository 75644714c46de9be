//! Document encoding: raw bytes → base64 [`EncodedDocument`].
//!
//! The document is never parsed here. It is size- and type-checked, then
//! wrapped as standard base64 so it can ride inside a chat message. Both
//! checks happen before any network call.

use crate::config::QuizConfig;
use crate::error::PipelineFailure;
use crate::model::EncodedDocument;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Encode an uploaded document for the prompt.
///
/// Rejects empty input, input larger than `config.max_document_bytes`, and
/// media types not listed in `config.accepted_media_types`.
pub fn encode_document(
    name: &str,
    media_type: &str,
    bytes: &[u8],
    config: &QuizConfig,
) -> Result<EncodedDocument, PipelineFailure> {
    let media_type = normalise_media_type(media_type);

    if !config.accepted_media_types.iter().any(|m| *m == media_type) {
        return Err(PipelineFailure::invalid_input(format!(
            "'{name}' has media type '{media_type}'; accepted: {}",
            config.accepted_media_types.join(", ")
        )));
    }
    if bytes.is_empty() {
        return Err(PipelineFailure::invalid_input(format!("'{name}' is empty")));
    }
    if bytes.len() > config.max_document_bytes {
        return Err(PipelineFailure::invalid_input(format!(
            "'{name}' is {} bytes; the limit is {} bytes",
            bytes.len(),
            config.max_document_bytes
        )));
    }

    let payload = STANDARD.encode(bytes);
    debug!("Encoded '{}' → {} bytes base64", name, payload.len());

    Ok(EncodedDocument::new(name.to_string(), media_type, payload))
}

/// Lower-case a media type and drop parameters (`; charset=...`).
pub fn normalise_media_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
