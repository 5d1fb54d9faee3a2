use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::completion::CompletionService;
use crate::config::Config;
use crate::handlers;

/// Extra time the router gives a request beyond the provider call limit, so
/// that a slow provider is reported by the handler rather than cut off here.
const TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub completions: CompletionService,
    pub config: Arc<Config>,
}

pub fn build_app(state: AppState) -> Router {
    let prefix = state.config.server.api_prefix.clone();
    let request_timeout = state.config.server.request_timeout();

    let api = Router::new()
        .route("/chat/completions", post(handlers::v1::chat_completions))
        .route("/chat/models", get(handlers::v1::list_models))
        .route("/health", get(handlers::health))
        .with_state(state);

    let router = Router::new().route("/livez", get(handlers::livez));
    let router = if prefix.is_empty() {
        router.merge(api)
    } else {
        router.nest(&prefix, api)
    };

    let router = if request_timeout.is_zero() {
        router
    } else {
        router.layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout + TIMEOUT_MARGIN,
        ))
    };

    router.layer(TraceLayer::new_for_http())
}
