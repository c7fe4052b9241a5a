//! The chat collaborator: messages in, a stream of text fragments out.
//!
//! [`OllamaChatClient`] talks to Ollama's `/api/chat` with `stream: true`.
//! The response body is newline-delimited JSON, one object per line:
//!
//! ```text
//! {"model":"llama3","message":{"role":"assistant","content":"| Invoice"},"done":false}
//! {"model":"llama3","message":{"role":"assistant","content":" # |"},"done":false}
//! {"model":"llama3","message":{"role":"assistant","content":""},"done":true, ...}
//! ```
//!
//! Network chunks do not respect line boundaries (a line, or even a UTF-8
//! character, may straddle two chunks), so [`NdjsonDecoder`] buffers bytes
//! and only hands out complete lines.
//!
//! The stream is finite and cannot be restarted. It ends after the first
//! `done: true` line, after the first error, or when the body ends.

use crate::config::OllamaConfig;
use crate::error::ChatError;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ordered text fragments of one streamed response.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// A chat endpoint that answers in streamed fragments.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `messages` and return the response as it is generated.
    ///
    /// Errors before the first byte (unreachable host, unknown model) are
    /// returned directly; errors after that arrive as stream items.
    async fn stream_chat(&self, messages: Vec<Message>) -> Result<FragmentStream, ChatError>;
}

#[async_trait]
impl<T: ChatClient + ?Sized> ChatClient for Arc<T> {
    async fn stream_chat(&self, messages: Vec<Message>) -> Result<FragmentStream, ChatError> {
        (**self).stream_chat(messages).await
    }
}

// ── Ollama ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Ollama `/api/chat` client.
#[derive(Debug, Clone)]
pub struct OllamaChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaChatClient {
    pub fn new(config: &OllamaConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ChatError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.host.trim().trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of the models the server has pulled (`GET /api/tags`).
    pub async fn health(&self) -> Result<Vec<String>, ChatError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Malformed(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn stream_chat(&self, messages: Vec<Message>) -> Result<FragmentStream, ChatError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
            options: self.temperature.map(|temperature| ChatOptions { temperature }),
        };

        info!(model = %self.model, messages = messages.len(), "chat request");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;

        if !response.status().is_success() {
            let err = status_error(response).await;
            warn!("chat request rejected: {}", err);
            return Err(err);
        }

        Ok(fragments_from_bytes(url, response.bytes_stream()))
    }
}

fn transport(url: &str, e: reqwest::Error) -> ChatError {
    ChatError::Transport {
        url: url.to_string(),
        detail: e.to_string(),
    }
}

async fn status_error(response: reqwest::Response) -> ChatError {
    let status = response.status().as_u16();
    let raw = response.text().await.unwrap_or_default();
    // Ollama reports `{"error": "..."}`; fall back to the raw body.
    let body = serde_json::from_str::<ChatChunk>(&raw)
        .ok()
        .and_then(|c| c.error)
        .unwrap_or(raw);
    ChatError::Status { status, body }
}

// ── NDJSON framing ───────────────────────────────────────────────────────

/// Reassembles newline-delimited lines from arbitrarily split chunks.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every line it completed. Blank lines are
    /// dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// The unterminated trailing line, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

struct Decode<S> {
    url: String,
    body: Pin<Box<S>>,
    decoder: NdjsonDecoder,
    ready: VecDeque<Result<String, ChatError>>,
    finished: bool,
}

impl<S> Decode<S> {
    fn accept(&mut self, line: &str) {
        if self.finished {
            return;
        }
        match serde_json::from_str::<ChatChunk>(line) {
            Ok(chunk) => {
                if let Some(error) = chunk.error {
                    self.ready.push_back(Err(ChatError::Api(error)));
                    self.finished = true;
                    return;
                }
                if let Some(message) = chunk.message {
                    if !message.content.is_empty() {
                        self.ready.push_back(Ok(message.content));
                    }
                }
                if chunk.done {
                    debug!("chat stream done");
                    self.finished = true;
                }
            }
            Err(e) => {
                self.ready
                    .push_back(Err(ChatError::Malformed(format!("{e}: {line}"))));
                self.finished = true;
            }
        }
    }
}

/// Turn an NDJSON response body into a [`FragmentStream`].
///
/// `url` is only used in transport error messages.
pub fn fragments_from_bytes<S, B, E>(url: impl Into<String>, body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = Decode {
        url: url.into(),
        body: Box::pin(body),
        decoder: NdjsonDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                if item.is_err() {
                    st.ready.clear();
                }
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    for line in st.decoder.push(chunk.as_ref()) {
                        st.accept(&line);
                    }
                }
                Some(Err(e)) => {
                    st.ready.push_back(Err(ChatError::Transport {
                        url: st.url.clone(),
                        detail: e.to_string(),
                    }));
                    st.finished = true;
                }
                None => {
                    if let Some(line) = st.decoder.finish() {
                        st.accept(&line);
                    }
                    st.finished = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn line(content: &str, done: bool) -> String {
        format!(
            "{}\n",
            serde_json::json!({
                "model": "llama3",
                "message": {"role": "assistant", "content": content},
                "done": done
            })
        )
    }

    async fn collect(chunks: Vec<Vec<u8>>) -> Vec<Result<String, ChatError>> {
        let body = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        fragments_from_bytes("http://test/api/chat", body)
            .collect()
            .await
    }

    #[test]
    fn decoder_reassembles_split_lines() {
        let mut d = NdjsonDecoder::new();
        assert!(d.push(b"{\"a\":").is_empty());
        assert_eq!(d.push(b"1}\n{\"b\""), vec!["{\"a\":1}".to_string()]);
        assert_eq!(d.push(b":2}\n\n"), vec!["{\"b\":2}".to_string()]);
        assert_eq!(d.finish(), None);
    }

    #[test]
    fn decoder_handles_split_utf8() {
        let mut d = NdjsonDecoder::new();
        let euro = "€".as_bytes();
        assert!(d.push(&euro[..1]).is_empty());
        assert_eq!(d.push(&[&euro[1..], b"\n"].concat()), vec!["€".to_string()]);
    }

    #[test]
    fn decoder_finish_returns_unterminated_line() {
        let mut d = NdjsonDecoder::new();
        d.push(b"{\"done\":true}");
        assert_eq!(d.finish().as_deref(), Some("{\"done\":true}"));
    }

    #[tokio::test]
    async fn fragments_in_order() {
        let body = [line("| Invoice", false), line(" # |", false), line("", true)].concat();
        let out: Vec<String> = collect(vec![body.into_bytes()])
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, vec!["| Invoice", " # |"]);
    }

    #[tokio::test]
    async fn fragments_across_chunk_boundaries() {
        let body = [line("Total", false), line(": $50", false), line("", true)].concat();
        let chunks: Vec<Vec<u8>> = body.as_bytes().chunks(7).map(<[u8]>::to_vec).collect();
        let out: Vec<String> = collect(chunks)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out.concat(), "Total: $50");
    }

    #[tokio::test]
    async fn lines_after_done_are_ignored() {
        let body = [line("a", false), line("", true), line("late", false)].concat();
        let out = collect(vec![body.into_bytes()]).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn error_line_ends_stream() {
        let body = [
            line("partial", false),
            "{\"error\":\"model crashed\"}\n".to_string(),
            line("never", false),
        ]
        .concat();
        let out = collect(vec![body.into_bytes()]).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_deref().unwrap(), "partial");
        match &out[1] {
            Err(ChatError::Api(msg)) => assert_eq!(msg, "model crashed"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_line_is_an_error() {
        let out = collect(vec![b"not json\n".to_vec()]).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(ChatError::Malformed(_))));
    }

    #[tokio::test]
    async fn body_error_is_transport() {
        let body = stream::iter(vec![
            Ok(line("x", false).into_bytes()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let out: Vec<_> = fragments_from_bytes("http://test/api/chat", body)
            .collect()
            .await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(ChatError::Transport { .. })));
    }

    #[test]
    fn request_body_shape() {
        let messages = vec![Message::user("hi")];
        let body = ChatRequest {
            model: "llama3",
            messages: &messages,
            stream: true,
            options: Some(ChatOptions { temperature: 0.5 }),
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["model"], "llama3");
        assert_eq!(v["stream"], true);
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "hi");
        assert_eq!(v["options"]["temperature"], 0.5);
    }

    #[test]
    fn client_trims_trailing_slash() {
        let mut config = crate::AppConfig::new("http://localhost:11434/", "llama3").ollama;
        config.temperature = None;
        let client = OllamaChatClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.model(), "llama3");
    }
}
