//! JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use chatgate_types::ErrorResponse;

use crate::llm::{DispatchError, LLMError};

/// Failure of a request that is answered with a JSON error body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Error generating completion: {0}")]
    Provider(#[from] LLMError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Dispatch(DispatchError::UnsupportedProvider(_)) => StatusCode::BAD_REQUEST,
            ApiError::Dispatch(DispatchError::NotConfigured(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error(self.status(), self.to_string())
    }
}

/// Build an error response with the given status.
pub fn error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorResponse {
        error: true,
        message: message.into(),
        code: Some(status.as_u16()),
    };
    (status, Json(body)).into_response()
}

pub fn bad_request(message: impl Into<String>) -> Response {
    error(StatusCode::BAD_REQUEST, message)
}
