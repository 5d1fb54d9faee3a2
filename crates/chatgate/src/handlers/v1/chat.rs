//! Chat completion HTTP handler.

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use chatgate_types::{ChatRequest, DONE_SENTINEL, StreamEvent};

use crate::response::{self, ApiError};
use crate::server::AppState;

/// POST {prefix}/chat/completions
///
/// Answers with a `ChatResponse` body, or with an SSE stream when the request
/// sets `stream`. Events emitted on a stream:
/// - `data: {"content": "..."}` per provider chunk
/// - `data: [DONE]` after the last chunk
/// - `data: {"error": "..."}` instead of `[DONE]` when the provider fails
///
/// An unsupported provider is rejected with 400 before any stream is opened.
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Response {
    if req.messages.is_empty() {
        return response::bad_request("messages must not be empty");
    }

    let (provider, client) = match state.completions.select(req.provider.as_deref()) {
        Ok(selected) => selected,
        Err(e) => return ApiError::from(e).into_response(),
    };

    if !req.stream {
        return match state
            .completions
            .complete(provider, client.as_ref(), &req)
            .await
        {
            Ok(completion) => Json(completion).into_response(),
            Err(e) => ApiError::from(e).into_response(),
        };
    }

    let events = state
        .completions
        .stream(provider, client, req)
        .map(|event| match event {
            StreamEvent::Chunk(chunk) => Event::default().json_data(chunk),
            StreamEvent::Done => Ok(Event::default().data(DONE_SENTINEL)),
        });

    let keep_alive = KeepAlive::new()
        .interval(state.config.server.keep_alive_interval())
        .text("keep-alive");

    Sse::new(events).keep_alive(keep_alive).into_response()
}
