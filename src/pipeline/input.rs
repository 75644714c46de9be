//! Input resolution: turn a path, URL or data URL into document bytes.
//!
//! Three input forms reach the pipeline:
//!
//! * a local file path (CLI),
//! * an HTTP/HTTPS URL (CLI),
//! * a `data:<type>;base64,<payload>` URL (the upload boundary in
//!   [`crate::api`]).
//!
//! Each resolves to a [`LoadedDocument`] which [`load_document`] then hands
//! to [`crate::pipeline::encode`]. The media type of files and downloads is
//! sniffed from the `%PDF` magic bytes when the source does not declare one.

use crate::config::QuizConfig;
use crate::error::PipelineFailure;
use crate::model::EncodedDocument;
use crate::pipeline::encode::{encode_document, normalise_media_type};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const PDF_MAGIC: &[u8] = b"%PDF";
const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

static RE_DATA_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^data:([^;,]*)((?:;[^;,]*)*),(.*)$").unwrap());

/// Raw document bytes plus what we know about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or URL and encode it for the prompt.
pub async fn load_document(input: &str, config: &QuizConfig) -> Result<EncodedDocument, PipelineFailure> {
    let loaded = resolve_input(input, config).await?;
    encode_document(&loaded.name, &loaded.media_type, &loaded.bytes, config)
}

/// Resolve the input string to document bytes.
pub async fn resolve_input(input: &str, config: &QuizConfig) -> Result<LoadedDocument, PipelineFailure> {
    if is_url(input) {
        download_url(input, config).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read a local file, mapping I/O errors to `invalid-input`.
async fn read_local(path: &Path) -> Result<LoadedDocument, PipelineFailure> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        let reason = match e.kind() {
            std::io::ErrorKind::NotFound => "file not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "permission denied".to_string(),
            _ => e.to_string(),
        };
        PipelineFailure::invalid_input(format!("cannot read '{}': {reason}", path.display()))
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Read local document: {} ({} bytes)", path.display(), bytes.len());
    Ok(LoadedDocument {
        name,
        media_type: sniff_media_type(&bytes).to_string(),
        bytes,
    })
}

/// Download a URL into memory.
async fn download_url(url: &str, config: &QuizConfig) -> Result<LoadedDocument, PipelineFailure> {
    info!("Downloading document from: {}", url);
    let timeout_secs = config.download_timeout_secs;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineFailure::invalid_input(format!("failed to download '{url}': {e}")))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PipelineFailure::invalid_input(format!(
                "download of '{url}' timed out after {timeout_secs}s"
            ))
        } else {
            PipelineFailure::invalid_input(format!("failed to download '{url}': {e}"))
        }
    })?;

    if !response.status().is_success() {
        return Err(PipelineFailure::invalid_input(format!(
            "failed to download '{url}': HTTP {}",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > config.max_document_bytes as u64 {
            return Err(PipelineFailure::invalid_input(format!(
                "'{url}' is {len} bytes; the limit is {} bytes",
                config.max_document_bytes
            )));
        }
    }

    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(normalise_media_type);

    let bytes = read_limited(url, response, config.max_document_bytes).await?;

    // Servers often label PDFs as octet-stream; trust the magic bytes then.
    let media_type = match declared {
        Some(m) if m != UNKNOWN_MEDIA_TYPE => m,
        _ => sniff_media_type(&bytes).to_string(),
    };

    info!("Downloaded {} bytes ({})", bytes.len(), media_type);
    Ok(LoadedDocument {
        name: filename_from_url(url),
        media_type,
        bytes,
    })
}

/// Read a response body, giving up once it grows past `max_bytes`.
///
/// Chunked responses carry no `Content-Length`, so the limit is enforced on
/// the running total rather than up front.
async fn read_limited(
    url: &str,
    response: reqwest::Response,
    max_bytes: usize,
) -> Result<Vec<u8>, PipelineFailure> {
    let mut body = response.bytes_stream();
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk
            .map_err(|e| PipelineFailure::invalid_input(format!("failed to download '{url}': {e}")))?;
        if bytes.len() + chunk.len() > max_bytes {
            return Err(PipelineFailure::invalid_input(format!(
                "'{url}' exceeds the limit of {max_bytes} bytes"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Decode a `data:` URL (or a bare base64 string) from an upload.
///
/// `declared_type` is used when the URL itself carries no media type.
/// Payloads that would decode to more than `max_bytes` are rejected before
/// decoding.
pub fn decode_data_url(
    name: &str,
    declared_type: &str,
    data: &str,
    max_bytes: usize,
) -> Result<LoadedDocument, PipelineFailure> {
    let (media_type, payload) = match RE_DATA_URL.captures(data.trim()) {
        Some(caps) => {
            let params = caps.get(2).map_or("", |m| m.as_str());
            if !params.split(';').any(|p| p.trim().eq_ignore_ascii_case("base64")) {
                return Err(PipelineFailure::invalid_input(format!(
                    "'{name}' is not base64-encoded"
                )));
            }
            let url_type = caps.get(1).map_or("", |m| m.as_str());
            let media_type = if url_type.trim().is_empty() {
                declared_type
            } else {
                url_type
            };
            (normalise_media_type(media_type), caps.get(3).map_or("", |m| m.as_str()))
        }
        None => (normalise_media_type(declared_type), data.trim()),
    };

    let payload = payload.trim();
    let padding = payload.bytes().rev().take_while(|b| *b == b'=').count();
    let decoded_len = (payload.len() / 4 * 3).saturating_sub(padding);
    if decoded_len > max_bytes {
        return Err(PipelineFailure::invalid_input(format!(
            "'{name}' is about {decoded_len} bytes; the limit is {max_bytes} bytes"
        )));
    }

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| PipelineFailure::invalid_input(format!("'{name}' has invalid base64: {e}")))?;

    Ok(LoadedDocument {
        name: name.to_string(),
        media_type,
        bytes,
    })
}

fn sniff_media_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(PDF_MAGIC) {
        "application/pdf"
    } else {
        UNKNOWN_MEDIA_TYPE
    }
}

/// Extract a reasonable filename from the URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
