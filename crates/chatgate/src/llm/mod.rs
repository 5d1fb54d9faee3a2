//! LLM provider clients for chat completions.

mod error;
mod lines;
mod normalize;
mod ollama;
mod openai;
mod provider;
mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{DispatchError, LLMError};
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use provider::{ChunkStream, LLMProvider};
pub use registry::ProviderRegistry;
