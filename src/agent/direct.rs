//! Direct Messages API backend
//!
//! Tool-free and streaming, so the first sentence can be spoken while the
//! rest is still being generated.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::backend::{Backend, EventStream, TurnRequest};
use super::events::{ProtocolEvent, ResultSubtype};
use crate::{Error, Result};

/// Model used when none is configured
pub const DEFAULT_QUICK_MODEL: &str = "claude-haiku-4-5";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 300;

/// Streaming Messages API client
pub struct DirectApi {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl DirectApi {
    /// Create a client with default endpoint and limits
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_QUICK_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Override the API base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the response token limit
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [Message<'a>; 1],
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseEvent {
    ContentBlockDelta { delta: SseDelta },
    Error { error: SseError },
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct SseDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct SseError {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl Backend for DirectApi {
    fn name(&self) -> &'static str {
        "messages-api"
    }

    async fn run(&self, request: TurnRequest) -> Result<EventStream> {
        let handle = request
            .continuity_handle
            .clone()
            .unwrap_or_else(|| format!("quick-{}", uuid::Uuid::new_v4()));
        let model = request.model.as_deref().unwrap_or(&self.model);

        let body = MessagesRequest {
            model,
            max_tokens: self.max_tokens,
            system: Some(request.system_prompt.as_str()).filter(|s| !s.is_empty()),
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
            stream: true,
        };

        tracing::debug!(model, "messages api request");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %text, "messages api error");
            let failed = failure(&handle, format!("API error {status}: {text}"));
            return Ok(Box::pin(stream::iter([Ok::<_, Error>(failed)])));
        }

        let body = response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec()));
        Ok(Box::pin(sse_events(body, handle)))
    }
}

fn failure(handle: &str, error: String) -> ProtocolEvent {
    ProtocolEvent::Result {
        subtype: ResultSubtype::Error,
        session_id: Some(handle.to_string()),
        result: None,
        error: Some(error),
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

struct SseState {
    body: ByteStream,
    pending: Vec<u8>,
    text: String,
    handle: String,
    queue: VecDeque<Result<ProtocolEvent>>,
    failed: Option<String>,
    done: bool,
}

impl SseState {
    /// Decode every complete line in the pending buffer
    fn drain_lines(&mut self) {
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim());
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };

        match serde_json::from_str::<SseEvent>(data.trim()) {
            Ok(SseEvent::ContentBlockDelta { delta }) => {
                if let Some(text) = delta.text.filter(|t| !t.is_empty()) {
                    self.text.push_str(&text);
                    self.queue.push_back(Ok(ProtocolEvent::StreamDelta { text }));
                }
            }
            Ok(SseEvent::Error { error }) => {
                tracing::warn!(error = %error.message, "messages api stream error");
                self.failed = Some(error.message);
            }
            Ok(SseEvent::MessageStop | SseEvent::Other) => {}
            Err(e) => tracing::debug!(error = %e, "skipping undecodable sse data"),
        }
    }

    fn finish(&mut self) {
        let event = match self.failed.take() {
            Some(error) => failure(&self.handle, error),
            None => ProtocolEvent::Result {
                subtype: ResultSubtype::Success,
                session_id: Some(self.handle.clone()),
                result: Some(std::mem::take(&mut self.text)),
                error: None,
            },
        };
        self.queue.push_back(Ok(event));
        self.done = true;
    }
}

/// Turn an SSE byte stream into protocol events, ending with a result
fn sse_events(
    body: impl Stream<Item = reqwest::Result<Vec<u8>>> + Send + 'static,
    handle: String,
) -> impl Stream<Item = Result<ProtocolEvent>> + Send {
    let state = SseState {
        body: Box::pin(body),
        pending: Vec::new(),
        text: String::new(),
        handle,
        queue: VecDeque::new(),
        failed: None,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some((event, state));
            }
            if state.done {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    state.pending.extend_from_slice(&chunk);
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.failed = Some(e.to_string());
                    state.queue.push_back(Err(Error::Http(e)));
                    state.finish();
                }
                None => {
                    state.pending.push(b'\n');
                    state.drain_lines();
                    state.finish();
                }
            }
        }
    })
}
