//! # Error Handling
//!
//! Defines the error taxonomy for the transcription pipeline and the single
//! boundary translator that flattens it onto the wire contract.
//!
//! ## Error Categories:
//! - **Client errors (400)**: the request itself was unusable — no payload,
//!   undecodable base64, a non-media signature, or an oversized upload
//! - **Server errors (500)**: everything past validation — disk I/O,
//!   transcription failures, timeouts, and the catch-all
//!
//! ## Wire Contract:
//! Every failure collapses to `{"detail": "<message>"}` with one of exactly
//! two status classes. The finer-grained kind survives only in the logs,
//! emitted here at the boundary so handlers never log errors themselves.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Failure kinds for each stage of the request pipeline.
///
/// The variants mirror the pipeline stages: payload decoding can raise
/// `MissingPayload` or `InvalidEncoding`, the sniff gate raises
/// `InvalidMediaType`, persistence raises `Storage`, and the model call
/// raises `Transcription` or `Timeout`. `Internal` is the catch-all for
/// anything that escapes the taxonomy.
#[derive(Debug)]
pub enum ApiError {
    /// Neither an upload nor base64 data was provided, or it was empty
    MissingPayload(String),

    /// The base64 payload could not be decoded
    InvalidEncoding(String),

    /// The payload's content signature is neither audio, video, nor opaque binary
    InvalidMediaType(String),

    /// The payload exceeds the configured upload cap
    PayloadTooLarge(String),

    /// Writing or removing the temp artifact failed
    Storage(String),

    /// The model capability rejected or failed on the artifact
    Transcription(String),

    /// The model call exceeded the configured deadline
    Timeout(String),

    /// Anything not covered by the taxonomy above
    Internal(String),
}

impl ApiError {
    /// Machine-readable kind label, used for structured logging at the boundary.
    fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingPayload(_) => "missing_payload",
            ApiError::InvalidEncoding(_) => "invalid_encoding",
            ApiError::InvalidMediaType(_) => "invalid_media_type",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::Storage(_) => "storage_error",
            ApiError::Transcription(_) => "transcription_failed",
            ApiError::Timeout(_) => "timeout",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::MissingPayload(msg)
            | ApiError::InvalidEncoding(msg)
            | ApiError::InvalidMediaType(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::Storage(msg)
            | ApiError::Transcription(msg)
            | ApiError::Timeout(msg)
            | ApiError::Internal(msg) => msg,
        }
    }

    fn is_client_error(&self) -> bool {
        matches!(
            self,
            ApiError::MissingPayload(_)
                | ApiError::InvalidEncoding(_)
                | ApiError::InvalidMediaType(_)
                | ApiError::PayloadTooLarge(_)
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

/// Boundary translation to the two externally visible error classes.
///
/// The response body is always `{"detail": "<message>"}`; the kind label is
/// logged here and nowhere else.
impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let status = if self.is_client_error() {
            actix_web::http::StatusCode::BAD_REQUEST
        } else {
            actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), detail = self.message(), "request failed");
        } else {
            tracing::warn!(kind = self.kind(), detail = self.message(), "request rejected");
        }

        HttpResponse::build(status).json(json!({
            "detail": self.message()
        }))
    }
}

/// Opaque internal failures flatten into the catch-all.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Disk I/O during artifact handling maps to the storage kind.
impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Storage(err.to_string())
    }
}

/// Type alias for Results that use the pipeline error type.
pub type ApiResult<T> = Result<T, ApiError>;
