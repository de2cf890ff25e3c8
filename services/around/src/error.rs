//! Failure kinds surfaced to API callers.
//!
//! Every operation aborts on its first failure; nothing is retried. The
//! `Display` form carries internal detail for logs, while `public_message`
//! is what the caller sees.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage write failed: {0:#}")]
    StorageWrite(#[source] anyhow::Error),

    #[error("Classification failed: {0:#}")]
    Classification(#[source] anyhow::Error),

    #[error("Index write failed: {0:#}")]
    IndexWrite(#[source] anyhow::Error),

    #[error("Index read failed: {0:#}")]
    IndexRead(#[source] anyhow::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ServiceError {
    /// Stable machine-readable code, also used as a metrics label
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "UNAUTHORIZED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::MediaUnavailable(_) => "MEDIA_UNAVAILABLE",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::StorageWrite(_) => "STORAGE_WRITE_FAILED",
            Self::Classification(_) => "CLASSIFICATION_FAILED",
            Self::IndexWrite(_) => "INDEX_WRITE_FAILED",
            Self::IndexRead(_) => "INDEX_READ_FAILED",
            Self::Serialization(_) => "SERIALIZATION_FAILED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) | Self::MediaUnavailable(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the caller. Adapter detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Authentication(_) => "Missing or invalid credentials".to_string(),
            Self::Validation(detail) => format!("Invalid request: {detail}"),
            Self::MediaUnavailable(_) => "Image is not available".to_string(),
            Self::PayloadTooLarge(_) => "Request body is too large".to_string(),
            Self::StorageWrite(_) => "Failed to save media to storage".to_string(),
            Self::Classification(_) => "Failed to annotate image".to_string(),
            Self::IndexWrite(_) => "Failed to save post to index".to_string(),
            Self::IndexRead(_) => "Failed to read posts from index".to_string(),
            Self::Serialization(_) => "Failed to encode posts".to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, code = self.code(), "Request failed");
        } else {
            warn!(error = %self, code = self.code(), "Request rejected");
        }

        let body = ErrorResponse {
            error: self.public_message(),
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServiceError::Authentication("no token".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::Validation("lat".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::MediaUnavailable("empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::PayloadTooLarge("40 MiB".into()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ServiceError::IndexWrite(anyhow!("down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_public_message_hides_adapter_detail() {
        let err = ServiceError::StorageWrite(anyhow!("AccessDenied: bucket policy"));
        assert_eq!(err.public_message(), "Failed to save media to storage");
        assert!(err.to_string().contains("AccessDenied"));
    }

    #[test]
    fn test_each_kind_has_distinct_code() {
        let errors = [
            ServiceError::Authentication(String::new()),
            ServiceError::Validation(String::new()),
            ServiceError::MediaUnavailable(String::new()),
            ServiceError::PayloadTooLarge(String::new()),
            ServiceError::StorageWrite(anyhow!("x")),
            ServiceError::Classification(anyhow!("x")),
            ServiceError::IndexWrite(anyhow!("x")),
            ServiceError::IndexRead(anyhow!("x")),
        ];

        let mut codes: Vec<_> = errors.iter().map(ServiceError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
