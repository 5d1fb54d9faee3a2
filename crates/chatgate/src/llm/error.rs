//! LLM error types.

use std::time::Duration;

use chatgate_types::{Provider, UnknownProvider};
use thiserror::Error;

/// Errors that can occur when calling a provider backend.
#[derive(Debug, Error)]
pub enum LLMError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body or stream line was not valid JSON of the expected shape
    #[error("malformed provider response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Response parsed but cannot be mapped to a completion
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// Provider reported an error inside an open stream
    #[error("provider stream error: {0}")]
    Stream(String),

    /// No reply (or no next chunk) within the allowed time
    #[error("provider did not respond within {0:?}")]
    Timeout(Duration),
}

/// Turn a non-2xx response into `LLMError::Api`, keeping the body text.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, LLMError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(LLMError::Api { status, message })
}

/// Errors raised while choosing a provider for a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Requested provider is not in the supported set.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Provider is supported but has no client registered.
    #[error("provider '{0}' is not configured")]
    NotConfigured(Provider),
}

impl From<UnknownProvider> for DispatchError {
    fn from(err: UnknownProvider) -> Self {
        DispatchError::UnsupportedProvider(err.0)
    }
}
