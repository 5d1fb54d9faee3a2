//! In-memory provider for tests.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::Utc;
use futures::Stream;

use chatgate_types::{ChatRequest, ChatResponse, Choice, Message, Usage};

use super::error::LLMError;
use super::provider::{ChunkStream, LLMProvider};

/// What a [`FakeProvider`] stream does once its chunks run out.
#[derive(Clone)]
pub(crate) enum Tail {
    /// End normally.
    End,
    /// Fail with a stream error.
    Fail(String),
    /// Never yield again.
    Hang,
}

/// Scripted provider that records how it was used.
pub(crate) struct FakeProvider {
    reply: Result<String, String>,
    chunks: Vec<String>,
    tail: Tail,
    models: Result<Vec<String>, String>,
    silent: bool,
    calls: AtomicUsize,
    last_request: std::sync::Mutex<Option<ChatRequest>>,
    pulled: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl FakeProvider {
    fn new() -> Self {
        Self {
            reply: Ok(String::new()),
            chunks: Vec::new(),
            tail: Tail::End,
            models: Ok(Vec::new()),
            silent: false,
            calls: AtomicUsize::new(0),
            last_request: std::sync::Mutex::new(None),
            pulled: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Non-streaming calls answer with `content`.
    pub(crate) fn replying(content: &str) -> Self {
        Self {
            reply: Ok(content.to_string()),
            chunks: vec![content.to_string()],
            ..Self::new()
        }
    }

    /// Streaming calls yield `chunks`, then behave as `tail`.
    pub(crate) fn streaming(chunks: &[&str], tail: Tail) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            tail,
            ..Self::new()
        }
    }

    /// Every call fails before producing anything.
    pub(crate) fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            models: Err(message.to_string()),
            ..Self::new()
        }
    }

    /// Non-streaming calls never answer.
    pub(crate) fn unresponsive() -> Self {
        Self {
            silent: true,
            ..Self::new()
        }
    }

    pub(crate) fn with_models(mut self, models: &[&str]) -> Self {
        self.models = Ok(models.iter().map(|m| m.to_string()).collect());
        self
    }

    /// Number of completion calls made.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of chunks consumed from streams.
    pub(crate) fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    /// Whether a stream handed out by this provider has been dropped.
    pub(crate) fn stream_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().unwrap().clone()
    }

    fn record(&self, request: &ChatRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
    }

    fn error(message: &str) -> LLMError {
        LLMError::Api {
            status: 502,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl LLMProvider for FakeProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LLMError> {
        self.record(request);
        if self.silent {
            futures::future::pending::<()>().await;
        }
        let content = self.reply.clone().map_err(|m| Self::error(&m))?;

        Ok(ChatResponse {
            id: "fake-1".to_string(),
            model: request.model.clone().unwrap_or_else(|| "fake".to_string()),
            created: Utc::now().timestamp(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage::default(),
        })
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LLMError> {
        self.record(request);
        if let Err(ref message) = self.reply {
            return Err(Self::error(message));
        }

        let items: Vec<Result<String, LLMError>> = self.chunks.iter().cloned().map(Ok).collect();
        let head = futures::stream::iter(items);
        let tail: ChunkStream = match self.tail.clone() {
            Tail::End => Box::pin(futures::stream::empty()),
            Tail::Fail(message) => Box::pin(futures::stream::iter([Err(LLMError::Stream(message))])),
            Tail::Hang => Box::pin(futures::stream::pending()),
        };

        Ok(Box::pin(Tracked {
            inner: Box::pin(futures::StreamExt::chain(head, tail)),
            pulled: self.pulled.clone(),
            dropped: self.dropped.clone(),
        }))
    }

    async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        self.models.clone().map_err(|m| Self::error(&m))
    }
}

/// Counts consumed items and notices being dropped.
struct Tracked {
    inner: ChunkStream,
    pulled: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl Stream for Tracked {
    type Item = Result<String, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(_)) = poll {
            self.pulled.fetch_add(1, Ordering::SeqCst);
        }
        poll
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}
