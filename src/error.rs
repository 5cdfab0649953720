use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

// Failures talking to the counter store. Never reach the client: the guard fails open.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store request failed: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("counter store did not answer within {0:?}")]
    Timeout(Duration),
}

// Errors surfaced by the contact endpoint
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request body")]
    InvalidBody,
    #[error("Incomplete data")]
    IncompleteData,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidBody | AppError::IncompleteData => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
