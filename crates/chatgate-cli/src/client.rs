//! HTTP client for a Chatgate server.

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use tracing::debug;

use chatgate_types::{
    ChatRequest, ChatResponse, ErrorResponse, HealthResponse, ModelList, StreamChunk, StreamEvent,
};

use crate::sse::SseDecoder;

/// How a streamed completion ended.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    Done,
    Failed(String),
    /// The connection closed without `[DONE]` or an error event.
    Truncated,
}

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.http.get(self.url("/health")).send().await?;
        Ok(checked(response).await?.json().await?)
    }

    pub async fn models(&self) -> Result<ModelList> {
        let response = self.http.get(self.url("/chat/models")).send().await?;
        Ok(checked(response).await?.json().await?)
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .http
            .post(self.url("/chat/completions"))
            .json(request)
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    /// Stream a completion, handing each content piece to `on_content`.
    ///
    /// Stops at the first error returned by `on_content`.
    pub async fn chat_stream<F>(
        &self,
        request: &ChatRequest,
        mut on_content: F,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let response = self
            .http
            .post(self.url("/chat/completions"))
            .json(request)
            .send()
            .await?;
        let mut body = checked(response).await?.bytes_stream();

        let mut decoder = SseDecoder::default();
        while let Some(piece) = body.next().await {
            let piece = piece.context("reading event stream")?;
            for data in decoder.push(&piece) {
                if let Some(outcome) = handle(&data, &mut on_content)? {
                    return Ok(outcome);
                }
            }
        }

        if let Some(data) = decoder.finish()
            && let Some(outcome) = handle(&data, &mut on_content)?
        {
            return Ok(outcome);
        }
        Ok(StreamOutcome::Truncated)
    }
}

fn handle<F>(data: &str, on_content: &mut F) -> Result<Option<StreamOutcome>>
where
    F: FnMut(&str) -> Result<()>,
{
    let event = StreamEvent::parse(data).with_context(|| format!("unexpected event: {data}"))?;
    debug!(?event, "Received event");

    Ok(match event {
        StreamEvent::Chunk(StreamChunk::Content { content }) => {
            on_content(&content)?;
            None
        }
        StreamEvent::Chunk(StreamChunk::Error { error }) => Some(StreamOutcome::Failed(error)),
        StreamEvent::Done => Some(StreamOutcome::Done),
    })
}

/// Turn a non-2xx response into an error carrying the server's message.
async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => bail!("request failed ({status}): {}", body.message),
        Err(_) => bail!("request failed ({status}): {text}"),
    }
}
