//! HTTP-facing error taxonomy for the authorization server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// The error kinds a flow endpoint can surface, per the device/auth-code
/// grant state machines. Each variant carries just enough context for
/// logging; the wire body is fixed by `into_response`.
#[derive(Debug, thiserror::Error)]
pub enum DiracError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authorization pending")]
    PendingAuthorization,

    #[error("flow expired")]
    ExpiredFlow,

    #[error("invalid code: {0}")]
    InvalidCode(String),

    #[error("upstream identity provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("invalid jwt")]
    InvalidJwt,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unknown grant_type {0}")]
    NotImplemented(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for DiracError {
    fn into_response(self) -> Response {
        match self {
            DiracError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            DiracError::PendingAuthorization => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "authorization_pending" })),
            )
                .into_response(),
            DiracError::ExpiredFlow => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "expired_token" })),
            )
                .into_response(),
            DiracError::InvalidCode(msg) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": msg }))).into_response()
            }
            DiracError::UpstreamUnavailable(msg) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": msg })),
            )
                .into_response(),
            DiracError::InvalidJwt => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid_token" })),
            )
                .into_response(),
            DiracError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": msg }))).into_response()
            }
            DiracError::NotImplemented(grant) => (
                StatusCode::NOT_IMPLEMENTED,
                Json(json!({ "error": format!("unsupported grant_type: {}", grant) })),
            )
                .into_response(),
            DiracError::Internal(msg) => {
                error!("internal invariant violation: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal_error" })))
                    .into_response()
            }
        }
    }
}

pub type DiracResult<T> = Result<T, DiracError>;
