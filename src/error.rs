use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::services::transport::TransportError;

/// Errors surfaced by the session channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// An outbound action was attempted while not connected.
    #[error("cannot {action}: not connected to the session server")]
    NotConnected {
        /// Action that was attempted.
        action: &'static str,
    },
    /// The payload of an outbound action could not be serialised.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The server reported an error on the private error queue.
    #[error("server error {code}: {message}")]
    Server {
        /// Server-side error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

/// Errors that can occur in relay service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The requested ranking data does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
