//! Model listing HTTP handler.

use axum::Json;
use axum::extract::State;

use chatgate_types::ModelList;

use crate::server::AppState;

/// GET {prefix}/chat/models
///
/// Union of every provider's models. Providers that cannot be reached are
/// left out rather than failing the request.
pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let models = state.completions.list_models().await;
    Json(ModelList { models })
}
