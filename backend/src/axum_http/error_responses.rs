use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = Json(ErrorResponse {
        code: status.as_u16(),
        message: message.into(),
    });

    (status, body).into_response()
}

/// Maps a use-case error to its response. Server-side detail stays in the
/// logs, not in the client payload.
pub fn usecase_error(status: StatusCode, err: impl std::fmt::Display) -> Response {
    if status.is_server_error() {
        error_response(status, "Internal server error")
    } else {
        error_response(status, err.to_string())
    }
}
