//! Azure OpenAI chat-completions backend.
//!
//! Talks to `{endpoint}/openai/deployments/{deployment}/chat/completions`
//! directly over `reqwest`. One-shot calls read `choices[0].message.content`;
//! streaming calls set `stream: true` and read server-sent events, appending
//! each `choices[0].delta.content` to the reply and re-running
//! [`complete_array_elements`] so the caller sees questions as soon as their
//! closing brace arrives.
//!
//! Nothing is retried here: a non-2xx status or a broken connection surfaces
//! as [`PipelineFailure::Transport`] with the provider's error message.

use super::{
    CompletionChunk, CompletionClient, CompletionStream, Message, OutputSchema, RequestOptions, Role,
};
use crate::config::AzureCredentials;
use crate::error::PipelineFailure;
use crate::pipeline::extract::complete_array_elements;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::{debug, warn};

/// Raw chat-completions client for one Azure OpenAI deployment.
pub struct AzureChatClient {
    http: reqwest::Client,
    credentials: AzureCredentials,
}

impl AzureChatClient {
    /// Create a client; blank credentials fail here, before any request.
    pub fn new(credentials: AzureCredentials) -> Result<Self, PipelineFailure> {
        credentials.validate()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineFailure::configuration(format!("HTTP client: {e}")))?;
        Ok(Self { http, credentials })
    }

    /// Create a client from `AZURE_OPENAI_*` environment variables.
    pub fn from_env() -> Result<Self, PipelineFailure> {
        Self::new(AzureCredentials::from_env()?)
    }

    fn request_body<'a>(&'a self, messages: &[Message], options: &RequestOptions, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.credentials.deployment_id,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: m.render_text(),
                })
                .collect(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream,
        }
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, PipelineFailure> {
        let response = self
            .http
            .post(self.credentials.chat_completions_url())
            .header("api-key", &self.credentials.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineFailure::transport(Some(status), api_error_message(&text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for AzureChatClient {
    async fn complete_text(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<String, PipelineFailure> {
        let body = self.request_body(messages, options, false);
        let response = self.send(&body).await?;
        let reply: ChatResponse = response.json().await?;

        let Some(choice) = reply.choices.into_iter().next() else {
            return Err(PipelineFailure::transport(None, "reply contained no choices"));
        };
        check_finish_reason(choice.finish_reason.as_deref())?;
        let text = choice.message.content.unwrap_or_default();
        debug!("Azure reply: {} chars", text.len());
        Ok(text)
    }

    async fn complete_streaming(
        &self,
        messages: &[Message],
        schema: OutputSchema,
        options: &RequestOptions,
    ) -> Result<CompletionStream, PipelineFailure> {
        let body = self.request_body(messages, options, true);
        let response = self.send(&body).await?;

        let bytes: ByteStream = Box::pin(response.bytes_stream().map(|r| r.map(|b| b.to_vec())));
        Ok(sse_completion_stream(bytes, schema))
    }

    fn name(&self) -> &str {
        "azure-openai"
    }
}

// ── SSE decoding ─────────────────────────────────────────────────────────

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send>>;

struct SseState {
    body: ByteStream,
    buffer: Vec<u8>,
    parser: SseParser,
    pending: VecDeque<Result<CompletionChunk, PipelineFailure>>,
    finished: bool,
}

/// Turn a raw SSE byte stream into completion chunks.
fn sse_completion_stream(body: ByteStream, schema: OutputSchema) -> CompletionStream {
    let state = SseState {
        body,
        buffer: Vec::new(),
        parser: SseParser::new(schema),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }

            match st.body.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.extend_from_slice(&chunk);
                    while let Some(end) = find_event_end(&st.buffer) {
                        let event: Vec<u8> = st.buffer.drain(..end).collect();
                        let event = String::from_utf8_lossy(&event);
                        for item in st.parser.feed_event(&event) {
                            if item.is_err() {
                                st.finished = true;
                            }
                            st.pending.push_back(item);
                        }
                        if st.parser.done || st.finished {
                            break;
                        }
                    }
                    if st.parser.done && !st.finished {
                        st.finished = true;
                        st.pending.push_back(Ok(st.parser.finish()));
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending.push_back(Err(e.into()));
                }
                None => {
                    // Connection closed without `[DONE]`: flush what is left.
                    let rest = String::from_utf8_lossy(&st.buffer).into_owned();
                    st.buffer.clear();
                    st.finished = true;
                    let mut failed = false;
                    for item in st.parser.feed_event(&rest) {
                        failed |= item.is_err();
                        st.pending.push_back(item);
                    }
                    if !failed {
                        st.pending.push_back(Ok(st.parser.finish()));
                    }
                }
            }
        }
    }))
}

/// Index just past the first blank-line event separator, if any.
fn find_event_end(buf: &[u8]) -> Option<usize> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| p + 2);
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Accumulates SSE `data:` payloads into reply text and partial decodings.
struct SseParser {
    schema: OutputSchema,
    text: String,
    emitted: usize,
    done: bool,
}

impl SseParser {
    fn new(schema: OutputSchema) -> Self {
        Self {
            schema,
            text: String::new(),
            emitted: 0,
            done: false,
        }
    }

    /// Process one SSE event block.
    fn feed_event(&mut self, event: &str) -> Vec<Result<CompletionChunk, PipelineFailure>> {
        let mut out = Vec::new();
        for line in event.lines() {
            let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                self.done = true;
                break;
            }

            match serde_json::from_str::<StreamChunk>(data) {
                Ok(StreamChunk { error: Some(err), .. }) => {
                    out.push(Err(PipelineFailure::transport(None, err.message)));
                    return out;
                }
                Ok(chunk) => {
                    // Azure opens with a choice-less prompt-filter chunk.
                    let Some(choice) = chunk.choices.into_iter().next() else {
                        continue;
                    };
                    if let Err(e) = check_finish_reason(choice.finish_reason.as_deref()) {
                        out.push(Err(e));
                        return out;
                    }
                    let delta = choice.delta.content.unwrap_or_default();
                    if delta.is_empty() {
                        continue;
                    }
                    self.text.push_str(&delta);
                    if let Some(partial) = self.partial() {
                        out.push(Ok(partial));
                    }
                }
                Err(e) => warn!("Skipping unparsable SSE payload: {}", e),
            }
        }
        out
    }

    /// A new partial when more array elements have closed since the last one.
    fn partial(&mut self) -> Option<CompletionChunk> {
        if self.schema != OutputSchema::Array {
            return None;
        }
        let elements = complete_array_elements(&self.text);
        if elements.len() > self.emitted {
            self.emitted = elements.len();
            Some(CompletionChunk::Partial(serde_json::Value::Array(elements)))
        } else {
            None
        }
    }

    fn finish(&mut self) -> CompletionChunk {
        debug!("Azure streamed reply: {} chars", self.text.len());
        CompletionChunk::Final(std::mem::take(&mut self.text))
    }
}

/// A filtered reply is a transport failure; a truncated one is only logged,
/// since extraction will report it if the JSON is incomplete.
fn check_finish_reason(reason: Option<&str>) -> Result<(), PipelineFailure> {
    match reason {
        Some("content_filter") => Err(PipelineFailure::transport(
            None,
            "reply was blocked by the content filter",
        )),
        Some("length") => {
            warn!("Reply stopped at the max_tokens limit and is probably truncated");
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Pull a human-readable message out of an error body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                "empty error response".to_string()
            } else {
                body.trim().to_string()
            }
        })
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: Role,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    fn sse(deltas: &[&str]) -> String {
        let mut out = String::new();
        for d in deltas {
            let payload = serde_json::json!({"choices": [{"delta": {"content": d}}]});
            out.push_str(&format!("data: {payload}\n\n"));
        }
        out.push_str("data: [DONE]\n\n");
        out
    }

    fn byte_stream(raw: String, split: usize) -> ByteStream {
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> = raw
            .into_bytes()
            .chunks(split)
            .map(|c| Ok(c.to_vec()))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    #[test]
    fn api_error_message_prefers_json_message() {
        assert_eq!(
            api_error_message(r#"{"error":{"code":"429","message":"Rate limit reached"}}"#),
            "Rate limit reached"
        );
        assert_eq!(api_error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(api_error_message(""), "empty error response");
    }

    #[test]
    fn event_end_handles_both_separators() {
        assert_eq!(find_event_end(b"data: x\n\ndata: y"), Some(9));
        assert_eq!(find_event_end(b"data: x\r\n\r\n"), Some(11));
        assert_eq!(find_event_end(b"data: x\n"), None);
    }

    #[tokio::test]
    async fn streams_partials_then_final() {
        let raw = sse(&[
            "Here: [{\"question\":\"Q1\",\"options\":[\"a\",\"b\",\"c\",\"d\"],\"answer\":\"a\"}",
            ", {\"question\":\"Q2\",\"options\":[\"a\",\"b\",\"c\",\"d\"],",
            "\"answer\":\"b\"}]",
        ]);
        // Split into small byte chunks so events straddle reads.
        let chunks: Vec<_> = sse_completion_stream(byte_stream(raw, 7), OutputSchema::Array)
            .collect()
            .await;

        let lens: Vec<usize> = chunks
            .iter()
            .filter_map(|c| match c {
                Ok(CompletionChunk::Partial(v)) => v.as_array().map(|a| a.len()),
                _ => None,
            })
            .collect();
        assert_eq!(lens, vec![1, 2]);

        match chunks.last() {
            Some(Ok(CompletionChunk::Final(text))) => {
                assert!(text.starts_with("Here: ["));
                assert!(text.ends_with("}]"));
            }
            other => panic!("expected final chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn object_schema_yields_only_final() {
        let raw = sse(&["{\"review\":", "\"ok\"}"]);
        let chunks: Vec<_> = sse_completion_stream(byte_stream(raw, 64), OutputSchema::Object)
            .collect()
            .await;
        assert_eq!(chunks, vec![Ok(CompletionChunk::Final("{\"review\":\"ok\"}".into()))]);
    }

    #[tokio::test]
    async fn error_event_ends_stream_with_transport_failure() {
        let raw = "data: {\"error\":{\"message\":\"content filtered\"}}\n\n".to_string();
        let chunks: Vec<_> = sse_completion_stream(byte_stream(raw, 64), OutputSchema::Array)
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0],
            Err(PipelineFailure::transport(None, "content filtered"))
        );
    }

    #[tokio::test]
    async fn missing_done_still_yields_final() {
        let raw = "data: {\"choices\":[{\"delta\":{\"content\":\"[1]\"}}]}".to_string();
        let chunks: Vec<_> = sse_completion_stream(byte_stream(raw, 5), OutputSchema::Array)
            .collect()
            .await;
        assert_eq!(chunks.last(), Some(&Ok(CompletionChunk::Final("[1]".into()))));
    }

    #[test]
    fn new_rejects_blank_credentials() {
        let creds = AzureCredentials {
            api_key: String::new(),
            endpoint: "https://x.openai.azure.com".into(),
            deployment_id: "gpt".into(),
            api_version: "2025-01-01-preview".into(),
        };
        let err = AzureChatClient::new(creds).err().unwrap();
        assert_eq!(err.stage(), crate::error::FailureStage::Configuration);
    }

    #[tokio::test]
    async fn content_filter_stop_is_a_transport_failure() {
        let raw = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"[{\\\"q\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"content_filter\"}]}\n\n",
            "data: [DONE]\n\n",
        )
        .to_string();
        let chunks: Vec<_> = sse_completion_stream(byte_stream(raw, 16), OutputSchema::Array)
            .collect()
            .await;
        assert_eq!(
            chunks,
            vec![Err(PipelineFailure::transport(
                None,
                "reply was blocked by the content filter"
            ))]
        );
    }

    #[tokio::test]
    async fn length_stop_still_yields_final() {
        let raw = concat!(
            "data: {\"choices\":[]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"[1, 2\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"length\"}]}\n\n",
            "data: [DONE]\n\n",
        )
        .to_string();
        let chunks: Vec<_> = sse_completion_stream(byte_stream(raw, 64), OutputSchema::Array)
            .collect()
            .await;
        assert_eq!(chunks.last(), Some(&Ok(CompletionChunk::Final("[1, 2".into()))));
    }

    #[test]
    fn finish_reasons() {
        assert!(check_finish_reason(None).is_ok());
        assert!(check_finish_reason(Some("stop")).is_ok());
        assert!(check_finish_reason(Some("length")).is_ok());
        assert_eq!(
            check_finish_reason(Some("content_filter")).unwrap_err().stage(),
            crate::error::FailureStage::Transport
        );
    }

    // ── Over a local socket ──────────────────────────────────────────────

    /// Read one HTTP request (headers plus `Content-Length` body).
    async fn read_request(sock: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(head_end) = find_event_end(&buf) else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + body_len {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answer one request with `response`; the request text comes back on
    /// the returned channel.
    async fn serve_once(response: String) -> (AzureChatClient, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let request = read_request(&mut sock).await;
            sock.write_all(response.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
            let _ = tx.send(request);
        });

        let creds = AzureCredentials::new("k", format!("http://{addr}"), "d").unwrap();
        (AzureChatClient::new(creds).unwrap(), rx)
    }

    fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn opts() -> RequestOptions {
        RequestOptions {
            temperature: 0.7,
            max_tokens: 64,
        }
    }

    #[tokio::test]
    async fn rate_limit_status_is_kept() {
        let body = r#"{"error":{"code":"429","message":"Rate limit reached"}}"#;
        let (client, _rx) = serve_once(http_response("429 Too Many Requests", "application/json", body)).await;

        let err = client
            .complete_text(&[Message::user("hi")], &opts())
            .await
            .unwrap_err();
        assert_eq!(err, PipelineFailure::transport(Some(429), "Rate limit reached"));
    }

    #[tokio::test]
    async fn unauthorized_status_is_kept() {
        let body = r#"{"error":{"code":"401","message":"Access denied due to invalid subscription key."}}"#;
        let (client, _rx) = serve_once(http_response("401 Unauthorized", "application/json", body)).await;

        let err = client
            .complete_text(&[Message::user("hi")], &opts())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineFailure::Transport { status: Some(401), .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn complete_text_reads_first_choice_and_sends_key() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"[1,2]"},"finish_reason":"stop"}]}"#;
        let (client, rx) = serve_once(http_response("200 OK", "application/json", body)).await;

        let text = client
            .complete_text(&[Message::system("s"), Message::user("u")], &opts())
            .await
            .unwrap();
        assert_eq!(text, "[1,2]");

        let request = rx.await.unwrap();
        assert!(request.starts_with(
            "POST /openai/deployments/d/chat/completions?api-version=2025-01-01-preview"
        ));
        assert!(request.to_ascii_lowercase().contains("api-key: k"));
        assert!(request.contains("\"stream\":false"));
        assert!(request.contains("\"max_tokens\":64"));
    }

    #[tokio::test]
    async fn filtered_reply_fails_complete_text() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null},"finish_reason":"content_filter"}]}"#;
        let (client, _rx) = serve_once(http_response("200 OK", "application/json", body)).await;

        let err = client
            .complete_text(&[Message::user("u")], &opts())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), crate::error::FailureStage::Transport);
    }

    #[tokio::test]
    async fn streaming_over_socket_yields_partials_then_final() {
        let events = sse(&[
            "[{\"question\":\"Q1\",\"options\":[\"a\",\"b\",\"c\",\"d\"],\"answer\":\"a\"},",
            "{\"question\":\"Q2\",\"options\":[\"a\",\"b\",\"c\",\"d\"],\"answer\":\"b\"}]",
        ]);
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{events}"
        );
        let (client, rx) = serve_once(response).await;

        let chunks: Vec<_> = client
            .complete_streaming(&[Message::user("u")], OutputSchema::Array, &opts())
            .await
            .unwrap()
            .collect()
            .await;

        let lens: Vec<usize> = chunks
            .iter()
            .filter_map(|c| match c {
                Ok(CompletionChunk::Partial(v)) => v.as_array().map(Vec::len),
                _ => None,
            })
            .collect();
        assert_eq!(lens, vec![1, 2]);
        let quiz = match chunks.last() {
            Some(Ok(CompletionChunk::Final(text))) => crate::generate::finish_quiz(text, 2).unwrap(),
            other => panic!("expected final chunk, got {other:?}"),
        };
        assert_eq!(quiz.len(), 2);

        assert!(rx.await.unwrap().contains("\"stream\":true"));
    }

    #[tokio::test]
    async fn streaming_error_status_fails_before_stream() {
        let body = r#"{"error":{"message":"Rate limit reached"}}"#;
        let (client, _rx) = serve_once(http_response("429 Too Many Requests", "application/json", body)).await;

        let err = client
            .complete_streaming(&[Message::user("u")], OutputSchema::Array, &opts())
            .await
            .err()
            .unwrap();
        assert_eq!(err, PipelineFailure::transport(Some(429), "Rate limit reached"));
    }
}
