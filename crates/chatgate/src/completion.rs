//! Completion orchestration.
//!
//! Runs one request against the provider chosen for it and produces either a
//! single normalized response or a sequence of wire events. The streaming
//! branch owns the translation of provider failures into in-band events:
//! every stream ends in exactly one `[DONE]` or exactly one error event.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use futures::Stream;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use chatgate_types::{
    ChatRequest, ChatResponse, ModelDescriptor, Provider, StreamChunk, StreamEvent,
};

use crate::config::Config;
use crate::llm::{ChunkStream, DispatchError, LLMError, LLMProvider, ProviderRegistry};

// ============================================================================
// Settings
// ============================================================================

/// Time limits and pacing applied around provider calls.
///
/// A zero duration disables the corresponding limit or delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionSettings {
    /// Bound on a non-streaming call, or on opening a stream.
    pub request_timeout: Duration,
    /// Bound on the wait for each next stream chunk.
    pub idle_timeout: Duration,
    /// Delay between two pushed chunks.
    pub pacing: Duration,
}

impl CompletionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_timeout: config.server.request_timeout(),
            idle_timeout: config.server.idle_timeout(),
            pacing: config.streaming.pacing(),
        }
    }
}

async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, LLMError>
where
    F: Future<Output = Result<T, LLMError>>,
{
    if limit.is_zero() {
        return call.await;
    }
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_elapsed) => Err(LLMError::Timeout(limit)),
    }
}

fn with_idle_timeout(stream: ChunkStream, limit: Duration) -> ChunkStream {
    if limit.is_zero() {
        return stream;
    }
    let timed = tokio_stream::StreamExt::timeout(stream, limit);
    Box::pin(tokio_stream::StreamExt::map(timed, move |item| match item {
        Ok(chunk) => chunk,
        Err(_elapsed) => Err(LLMError::Timeout(limit)),
    }))
}

// ============================================================================
// CompletionService
// ============================================================================

/// Entry point for completions and model listing.
#[derive(Clone)]
pub struct CompletionService {
    registry: ProviderRegistry,
    settings: CompletionSettings,
}

impl CompletionService {
    pub fn new(registry: ProviderRegistry, settings: CompletionSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolve the provider for a request. See [`ProviderRegistry::select`].
    pub fn select(
        &self,
        requested: Option<&str>,
    ) -> Result<(Provider, Arc<dyn LLMProvider>), DispatchError> {
        self.registry.select(requested)
    }

    /// Run a non-streaming completion. Nothing partial is returned on failure.
    pub async fn complete(
        &self,
        provider: Provider,
        client: &dyn LLMProvider,
        request: &ChatRequest,
    ) -> Result<ChatResponse, LLMError> {
        info!(%provider, model = ?request.model, "Dispatching completion");

        match bounded(self.settings.request_timeout, client.complete(request)).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(%provider, error = %e, "Completion failed");
                Err(e)
            }
        }
    }

    /// Run a streaming completion.
    ///
    /// The provider is not contacted until the returned stream is first
    /// polled. Dropping the stream stops consumption and releases the
    /// provider connection.
    pub fn stream(
        &self,
        provider: Provider,
        client: Arc<dyn LLMProvider>,
        request: ChatRequest,
    ) -> CompletionStream {
        info!(%provider, model = ?request.model, "Dispatching streaming completion");

        let CompletionSettings {
            request_timeout,
            idle_timeout,
            pacing,
        } = self.settings;

        let connect = Box::pin(async move {
            let stream = bounded(request_timeout, client.complete_stream(&request)).await?;
            Ok(with_idle_timeout(stream, idle_timeout))
        });

        CompletionStream {
            provider,
            state: State::Connecting(connect),
            pacing,
            delay: None,
            emitted: 0,
        }
    }

    /// Models of every registered provider, tagged with their source.
    ///
    /// A provider that fails contributes nothing; the failure is logged and
    /// never reaches the caller.
    pub async fn list_models(&self) -> Vec<ModelDescriptor> {
        let limit = self.settings.request_timeout;

        let lookups = self.registry.iter().map(|(provider, client)| async move {
            match bounded(limit, client.list_models()).await {
                Ok(names) => names
                    .into_iter()
                    .map(|name| ModelDescriptor { name, provider })
                    .collect(),
                Err(e) => {
                    warn!(%provider, error = %e, "Failed to list models");
                    Vec::new()
                }
            }
        });

        futures::future::join_all(lookups)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

// ============================================================================
// CompletionStream
// ============================================================================

type Connecting = Pin<Box<dyn Future<Output = Result<ChunkStream, LLMError>> + Send>>;

enum State {
    Connecting(Connecting),
    Streaming(ChunkStream),
    Finished,
}

/// Wire events of one streaming completion.
///
/// Yields a content event per provider chunk, in provider order, then either
/// [`StreamEvent::Done`] or a single error event, then ends. The next chunk
/// is not requested before the previous one has been handed out.
pub struct CompletionStream {
    provider: Provider,
    state: State,
    pacing: Duration,
    delay: Option<Pin<Box<Sleep>>>,
    emitted: usize,
}

impl CompletionStream {
    fn fail(&mut self, error: LLMError) -> StreamEvent {
        warn!(
            provider = %self.provider,
            emitted = self.emitted,
            error = %error,
            "Streaming completion failed"
        );
        self.state = State::Finished;
        StreamEvent::Chunk(StreamChunk::Error {
            error: error.to_string(),
        })
    }
}

impl Stream for CompletionStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match &mut this.state {
                State::Connecting(connect) => match connect.as_mut().poll(cx) {
                    Poll::Ready(Ok(stream)) => this.state = State::Streaming(stream),
                    Poll::Ready(Err(e)) => return Poll::Ready(Some(this.fail(e))),
                    Poll::Pending => return Poll::Pending,
                },

                State::Streaming(stream) => {
                    if let Some(delay) = this.delay.as_mut() {
                        ready!(delay.as_mut().poll(cx));
                        this.delay = None;
                    }

                    match stream.as_mut().poll_next(cx) {
                        Poll::Ready(Some(Ok(content))) => {
                            this.emitted += 1;
                            if !this.pacing.is_zero() {
                                this.delay = Some(Box::pin(tokio::time::sleep(this.pacing)));
                            }
                            return Poll::Ready(Some(StreamEvent::Chunk(StreamChunk::Content {
                                content,
                            })));
                        }
                        Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(this.fail(e))),
                        Poll::Ready(None) => {
                            debug!(
                                provider = %this.provider,
                                emitted = this.emitted,
                                "Streaming completion finished"
                            );
                            this.state = State::Finished;
                            return Poll::Ready(Some(StreamEvent::Done));
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }

                State::Finished => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for CompletionStream {
    fn drop(&mut self) {
        if !matches!(self.state, State::Finished) {
            debug!(
                provider = %self.provider,
                emitted = self.emitted,
                "Stream abandoned by client, releasing provider connection"
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
