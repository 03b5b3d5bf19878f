//! Telephony Server
//!
//! HTTP and WebSocket surface for the telephony adapter layer: inbound call
//! webhooks, status callbacks, outbound call control and vendor audio streams.

pub mod http;
pub mod metrics;
pub mod pipeline;
pub mod state;
pub mod status;
pub mod webhook;
pub mod websocket;

pub use http::create_router;
pub use metrics::{init_metrics, metrics_handler};
pub use pipeline::DrainPipeline;
pub use state::AppState;
pub use status::{StatusLedger, StatusUpdate};
pub use websocket::AxumAudioConnection;

use axum::extract::rejection::PathRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use voice_agent_core::TelephonyError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Telephony(#[from] TelephonyError),

    #[error("Configuration error: {0}")]
    Config(#[from] voice_agent_config::ConfigError),

    #[error("Request timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PathRejection> for ServerError {
    fn from(rejection: PathRejection) -> Self {
        ServerError::InvalidRequest(rejection.body_text())
    }
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ServerError::Telephony(e) => match e {
                TelephonyError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
                TelephonyError::VendorApi { status: 404, .. } => StatusCode::NOT_FOUND,
                TelephonyError::VendorApi { .. } | TelephonyError::Transport(_) => {
                    StatusCode::BAD_GATEWAY
                },
                TelephonyError::UnrecognizedProvider | TelephonyError::ProtocolViolation(_) => {
                    StatusCode::BAD_REQUEST
                },
                TelephonyError::UnknownProvider(_) => StatusCode::NOT_FOUND,
                TelephonyError::AccountMismatch { .. } | TelephonyError::SignatureRejected { .. } => {
                    StatusCode::FORBIDDEN
                },
                TelephonyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::Config(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        StatusCode::from(&err)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let error_type = match &self {
            ServerError::Telephony(e) => e.kind().as_str(),
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::Timeout => "timeout",
            ServerError::Config(_) | ServerError::Internal(_) => "internal",
        };
        (
            status,
            Json(serde_json::json!({
                "status": "error",
                "error_type": error_type,
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}
