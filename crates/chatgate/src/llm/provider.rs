//! LLM provider trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use chatgate_types::{ChatRequest, ChatResponse};

use super::error::LLMError;

/// Normalized content increments of a streamed completion, in provider order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

/// A backend that can serve chat completions.
///
/// Implementations translate the unified request into their native call,
/// and hand back replies already mapped to the canonical shapes. They do not
/// retry and do not translate errors for the wire.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Make a non-streaming completion request.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LLMError>;

    /// Make a streaming completion request.
    ///
    /// Dropping the returned stream releases the underlying connection.
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LLMError>;

    /// Names of the models the backend currently offers.
    async fn list_models(&self) -> Result<Vec<String>, LLMError>;
}
