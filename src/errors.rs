use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const SERVER_ERROR: i64 = -32000;

/// Failures scoped to a single JSON-RPC request. These are always answered
/// with an `error` envelope and never affect other requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("Received a malformed method: {0}")]
    MalformedMethod(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("{0}")]
    Handler(String),
}

impl RpcError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidJson(_) => PARSE_ERROR,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::MalformedMethod(_) | Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::Handler(_) => SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("handler already registered for {0}")]
    DuplicateHandler(String),
    #[error("handler key {0} can never be reached from a wire method")]
    UnreachableKey(String),
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("listener failed: {0}")]
    Listener(#[source] io::Error),
    #[error("proxy cannot start from the {0:?} state")]
    InvalidState(crate::proxy::ProxyState),
    #[error("handler for {method} panicked")]
    HandlerPanicked { method: String },
    #[error("in-flight requests did not drain within {0:?}")]
    DrainTimeout(std::time::Duration),
}

/// Transport-level failures. Unlike [`RpcError`] these leave the JSON-RPC
/// layer and are rendered with a non-200 HTTP status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal error")]
    Internal { code: &'static str, message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl AppError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::Internal { code, message } => {
                tracing::error!(error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
                details: json!({}),
            }),
        )
            .into_response()
    }
}
