//! Streaming chat completions
//!
//! Talks to any OpenAI-compatible `/v1/chat/completions` endpoint (OpenAI,
//! Ollama, llama.cpp server) with `stream: true` and turns the server-sent
//! events into a stream of text fragments.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use url::Url;

use super::log::Message;
use crate::config::ChatConfig;
use crate::{Error, Result};

/// Text fragments of one assistant reply, in arrival order
///
/// Fragments are not sentence aligned. An `Err` item ends the reply.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Source of streamed assistant replies
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a reply stream for `messages`
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be sent or is rejected
    async fn stream_reply(&self, messages: &[Message]) -> Result<ChatStream>;
}

/// OpenAI-compatible streaming chat client
pub struct OpenAiChat {
    client: reqwest::Client,
    url: Url,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    /// Create a client for `url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the HTTP client cannot be built
    pub fn new(url: &str, model: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::Config(format!("invalid chat URL {url}: {e}")))?;

        // Replies stream for a while; only bound the connection phase
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url,
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configured URL is invalid
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        Self::new(&config.url, config.model.clone(), config.api_key.clone())
    }

    /// Model requested for replies
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn stream_reply(&self, messages: &[Message]) -> Result<ChatStream> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        let mut request = self.client.post(self.url.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(model = %self.model, messages = messages.len(), "opening chat stream");
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("chat request failed ({status}): {text}")));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();

        Ok(sse_fragments(body))
    }
}

/// One decoded server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Text appended to the reply
    Delta(String),
    /// `data: [DONE]` terminator
    Done,
}

/// Parse one SSE line
///
/// Blank lines, comments and non-`data` fields yield `None`, as do chunks
/// without text (role announcements, finish reasons).
///
/// # Errors
///
/// Returns error if the payload is not a completion chunk or carries an error
pub fn parse_sse_line(line: &str) -> Result<Option<SseEvent>> {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }
    if data.is_empty() {
        return Ok(None);
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| Error::Stream(format!("malformed chat chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(Error::Chat(format!("chat stream error: {error}")));
    }

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();

    Ok((!text.is_empty()).then_some(SseEvent::Delta(text)))
}

/// Incremental SSE line decoder
///
/// Buffers raw bytes so lines and multi-byte characters split across
/// network chunks are reassembled before parsing.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk and return the events of every complete line
    ///
    /// # Errors
    ///
    /// Returns error on the first malformed line
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(event) = parse_sse_line(&line)? {
                events.push(event);
            }
        }

        Ok(events)
    }

    /// Parse a trailing line that was not newline terminated
    ///
    /// # Errors
    ///
    /// Returns error if the trailing line is malformed
    pub fn finish(&mut self) -> Result<Option<SseEvent>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let rest = std::mem::take(&mut self.buffer);
        parse_sse_line(&String::from_utf8_lossy(&rest))
    }
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    queued: VecDeque<String>,
    finished: bool,
}

impl SseState {
    /// Queue deltas; returns true once the terminator is seen
    fn accept(&mut self, events: impl IntoIterator<Item = SseEvent>) -> bool {
        for event in events {
            match event {
                SseEvent::Delta(text) => self.queued.push_back(text),
                SseEvent::Done => return true,
            }
        }
        false
    }
}

/// Turn a raw SSE body into reply fragments
fn sse_fragments(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> ChatStream {
    let state = SseState {
        body,
        decoder: SseDecoder::new(),
        queued: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.queued.pop_front() {
                return Some((Ok(text), state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => match state.decoder.feed(&chunk) {
                    Ok(events) => state.finished = state.accept(events),
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                },
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(Error::Stream(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    match state.decoder.finish() {
                        Ok(event) => {
                            state.accept(event);
                        }
                        Err(e) => return Some((Err(e), state)),
                    }
                }
            }
        }
    }))
}
