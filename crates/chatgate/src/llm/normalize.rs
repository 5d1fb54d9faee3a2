//! Mapping from native provider replies to the canonical shapes.
//!
//! Everything here is pure: no I/O, no clock reads. Callers pass the
//! creation time in where one has to be synthesized.

use chatgate_types::{ChatResponse, Choice, Message, Provider, Usage};

use super::error::LLMError;
use super::ollama::{GenerateChunk, GenerateReply};
use super::openai::{Completion, CompletionChunk};

/// Pass an OpenAI completion through field by field.
pub(crate) fn from_openai_completion(completion: Completion) -> Result<ChatResponse, LLMError> {
    if completion.choices.is_empty() {
        return Err(LLMError::Malformed(format!(
            "completion {} has no choices",
            completion.id
        )));
    }

    let choices = completion
        .choices
        .into_iter()
        .map(|c| Choice {
            index: c.index,
            message: Message {
                role: c.message.role,
                content: c.message.content.unwrap_or_default(),
            },
            finish_reason: c.finish_reason,
        })
        .collect();

    Ok(ChatResponse {
        id: completion.id,
        model: completion.model,
        created: completion.created,
        choices,
        usage: completion.usage.unwrap_or_default(),
    })
}

/// Content of an OpenAI delta, if it carries any.
///
/// Role-only and empty deltas yield `None` and are not forwarded.
pub(crate) fn from_openai_chunk(chunk: CompletionChunk) -> Result<Option<String>, LLMError> {
    if let Some(error) = chunk.error {
        return Err(LLMError::Stream(error.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

/// Build a canonical response around an Ollama reply.
///
/// Ollama reports no id and no token counts, so the id is derived from the
/// creation time and usage is all zeros.
pub(crate) fn from_ollama_reply(reply: GenerateReply, model: &str, created: i64) -> ChatResponse {
    ChatResponse {
        id: format!("{}-{}", Provider::Ollama, created),
        model: reply.model.unwrap_or_else(|| model.to_string()),
        created,
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(reply.response),
            finish_reason: Some("stop".to_string()),
        }],
        usage: Usage::default(),
    }
}

/// Content of an Ollama stream line, if it has a `response` field.
///
/// Empty responses are forwarded as-is.
pub(crate) fn from_ollama_chunk(chunk: GenerateChunk) -> Result<Option<String>, LLMError> {
    if let Some(error) = chunk.error {
        return Err(LLMError::Stream(error));
    }
    Ok(chunk.response)
}
