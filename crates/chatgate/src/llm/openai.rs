//! OpenAI-compatible LLM provider.
//!
//! Speaks the `/chat/completions` and `/models` endpoints of the OpenAI API
//! and of servers that mimic it.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use chatgate_types::{ChatRequest, ChatResponse, DONE_SENTINEL, Message, Usage};

use super::error::{LLMError, ensure_success};
use super::lines::LineStream;
use super::normalize;
use super::provider::{ChunkStream, LLMProvider};

/// OpenAI-compatible provider.
pub struct OpenAIProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

impl OpenAIProvider {
    #[must_use]
    pub fn new(
        client: Client,
        base_url: String,
        api_key: Option<String>,
        default_model: String,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            default_model,
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = to_request(request, &self.default_model, stream);

        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);

        let response = self.authorized(req).send().await?;
        ensure_success(response).await
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LLMError> {
        let response = self.send(request, false).await?;
        let body = response.bytes().await?;
        let completion: Completion = serde_json::from_slice(&body)?;
        normalize::from_openai_completion(completion)
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LLMError> {
        let response = self.send(request, true).await?;
        let lines = LineStream::new(response.bytes_stream());
        Ok(Box::pin(StreamAdapter::new(lines)))
    }

    async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        let url = format!("{}/models", self.base_url);
        let response = self.authorized(self.client.get(&url)).send().await?;
        let response = ensure_success(response).await?;

        let page: ModelsPage = serde_json::from_slice(&response.bytes().await?)?;
        Ok(page.data.into_iter().map(|m| m.id).collect())
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

fn to_request<'a>(request: &'a ChatRequest, default_model: &'a str, stream: bool) -> Request<'a> {
    Request {
        model: request.model.as_deref().unwrap_or(default_model),
        messages: &request.messages,
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens,
        stream,
    }
}

/// Native non-streaming reply.
#[derive(Deserialize)]
pub(crate) struct Completion {
    pub(crate) id: String,
    pub(crate) model: String,
    pub(crate) created: i64,
    pub(crate) choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub(crate) usage: Option<Usage>,
}

#[derive(Deserialize)]
pub(crate) struct CompletionChoice {
    pub(crate) index: u32,
    pub(crate) message: CompletionMessage,
    #[serde(default)]
    pub(crate) finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct CompletionMessage {
    pub(crate) role: String,
    /// Null when the model answered with something other than text.
    #[serde(default)]
    pub(crate) content: Option<String>,
}

/// Native streamed partial reply.
#[derive(Deserialize)]
pub(crate) struct CompletionChunk {
    #[serde(default)]
    pub(crate) choices: Vec<ChunkChoice>,
    /// Some compatible servers report failures as a data line.
    #[serde(default)]
    pub(crate) error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
pub(crate) struct ChunkChoice {
    pub(crate) delta: Delta,
}

#[derive(Deserialize)]
pub(crate) struct Delta {
    #[serde(default)]
    pub(crate) content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ApiErrorBody {
    pub(crate) message: String,
}

#[derive(Deserialize)]
struct ModelsPage {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

// ============================================================================
// Streaming
// ============================================================================

/// Reads SSE `data:` lines and yields the normalized content of each delta.
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

            // Blank separators, comments and `event:` lines carry nothing
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == DONE_SENTINEL {
                self.done = true;
                return Poll::Ready(None);
            }

            let parsed = serde_json::from_str::<CompletionChunk>(data)
                .map_err(LLMError::from)
                .and_then(normalize::from_openai_chunk);

            match parsed {
                Ok(Some(content)) => return Poll::Ready(Some(Ok(content))),
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
