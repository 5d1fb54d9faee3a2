//! Wire protocol types for Chatgate.
//!
//! These are the provider-agnostic shapes exposed at the gateway boundary.
//! Every backend reply, whole or streamed, is normalized into them before it
//! leaves the server.
//!
//! # Streaming
//!
//! Streamed completions are sent as Server-Sent Events. Each event carries a
//! single `data:` line holding either a [`StreamChunk`] as JSON or the
//! [`DONE_SENTINEL`]:
//!
//! ```text
//! data: {"content":"he"}
//!
//! data: {"content":"llo"}
//!
//! data: [DONE]
//! ```
//!
//! A failed stream ends with `data: {"error":"..."}` instead of the sentinel.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Terminal marker of a successful stream.
pub const DONE_SENTINEL: &str = "[DONE]";

// ============================================================================
// Provider
// ============================================================================

/// The closed set of backends the gateway can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Hosted OpenAI-compatible chat completions API.
    OpenAI,
    /// Locally reachable Ollama daemon.
    Ollama,
}

impl Provider {
    /// All providers, in declaration order.
    pub const ALL: [Provider; 2] = [Provider::OpenAI, Provider::Ollama];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Ollama => "ollama",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Provider::OpenAI),
            "ollama" => Ok(Provider::Ollama),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A message in a chat conversation.
///
/// Roles are conventionally `system`, `user` or `assistant` but are passed
/// through without validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Requested backend. Kept as a string so that unknown values reach the
    /// dispatcher and are reported by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    #[serde(default = "default_top_p")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// An explicit `null` counts as `false`.
    #[serde(default, deserialize_with = "null_as_false")]
    pub stream: bool,
}

impl ChatRequest {
    /// Build a request with default sampling parameters.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: None,
            provider: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: None,
            stream: false,
        }
    }
}

fn default_temperature() -> Option<f32> {
    Some(0.7)
}

fn default_top_p() -> Option<f32> {
    Some(1.0)
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

// ============================================================================
// Responses
// ============================================================================

/// The canonical completion response every provider reply is mapped into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    /// Creation time in epoch seconds.
    pub created: i64,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

/// A single completion choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Payload of a single streamed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamChunk {
    Content { content: String },
    Error { error: String },
}

/// A decoded SSE `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(StreamChunk),
    Done,
}

impl StreamEvent {
    /// Decode the payload of one `data:` line.
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        if data == DONE_SENTINEL {
            return Ok(StreamEvent::Done);
        }
        serde_json::from_str(data).map(StreamEvent::Chunk)
    }
}

// ============================================================================
// Models / Health / Errors
// ============================================================================

/// A model offered by one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub provider: Provider,
}

/// Body of the model listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: f64,
}

/// JSON error body returned for non-streaming failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

// ============================================================================
// Tests
// ============================================================================
