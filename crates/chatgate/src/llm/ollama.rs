//! Ollama LLM provider.
//!
//! Uses the daemon's `/api/generate` endpoint for both streaming and
//! non-streaming completions, and `/api/tags` for model listing. The
//! conversation is flattened into a single prompt.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use chatgate_types::{ChatRequest, ChatResponse, Message};

use super::error::{LLMError, ensure_success};
use super::lines::LineStream;
use super::normalize;
use super::provider::{ChunkStream, LLMProvider};

/// Ollama daemon provider.
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(client: Client, base_url: String, default_model: String) -> Self {
        Self {
            client,
            base_url,
            default_model,
        }
    }

    fn model<'a>(&'a self, request: &'a ChatRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.default_model)
    }

    async fn generate(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LLMError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = to_request(request, self.model(request), stream);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        ensure_success(response).await
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LLMError> {
        let response = self.generate(request, false).await?;
        let reply: GenerateReply = serde_json::from_slice(&response.bytes().await?)?;
        Ok(normalize::from_ollama_reply(
            reply,
            self.model(request),
            Utc::now().timestamp(),
        ))
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LLMError> {
        let response = self.generate(request, true).await?;
        let lines = LineStream::new(response.bytes_stream());
        Ok(Box::pin(StreamAdapter::new(lines)))
    }

    async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = ensure_success(self.client.get(&url).send().await?).await?;

        let page: TagsPage = serde_json::from_slice(&response.bytes().await?)?;
        Ok(page.models.into_iter().map(|m| m.name).collect())
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: Options,
}

#[derive(Serialize)]
struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

fn to_request<'a>(request: &ChatRequest, model: &'a str, stream: bool) -> Request<'a> {
    Request {
        model,
        prompt: to_prompt(&request.messages),
        stream,
        options: Options {
            temperature: request.temperature,
            top_p: request.top_p,
            num_predict: request.max_tokens,
        },
    }
}

/// Flatten a conversation into `role: content` lines.
fn to_prompt(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Native non-streaming reply.
#[derive(Deserialize)]
pub(crate) struct GenerateReply {
    #[serde(default)]
    pub(crate) model: Option<String>,
    #[serde(default)]
    pub(crate) response: String,
}

/// One NDJSON line of a streamed reply.
#[derive(Deserialize)]
pub(crate) struct GenerateChunk {
    #[serde(default)]
    pub(crate) response: Option<String>,
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) done: bool,
}

#[derive(Deserialize)]
struct TagsPage {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

// ============================================================================
// Streaming
// ============================================================================

/// Reads NDJSON lines and yields the normalized content of each.
struct StreamAdapter<S> {
    lines: LineStream<S>,
    done: bool,
}

impl<S> StreamAdapter<S> {
    fn new(lines: LineStream<S>) -> Self {
        Self { lines, done: false }
    }
}

impl<S, E> Stream for StreamAdapter<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<LLMError>,
{
    type Item = Result<String, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            let line = match self.lines.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(line))) => line,
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let chunk = match serde_json::from_str::<GenerateChunk>(line) {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!(error = %e, line, "Skipping undecodable Ollama stream line");
                    continue;
                }
            };
            let last = chunk.done;

            match normalize::from_ollama_chunk(chunk) {
                Ok(Some(content)) => {
                    self.done = last;
                    return Poll::Ready(Some(Ok(content)));
                }
                Ok(None) if last => {
                    self.done = true;
                    return Poll::Ready(None);
                }
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
