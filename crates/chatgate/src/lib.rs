//! Chatgate - one chat completion API in front of OpenAI and Ollama.
//!
//! Requests name a provider (or fall back to the configured default), are
//! forwarded in the provider's native shape, and come back normalized into
//! the types of [`chatgate_types`], either whole or as an SSE stream.

pub mod completion;
pub mod config;
pub mod handlers;
pub mod llm;
pub mod response;
pub mod server;
