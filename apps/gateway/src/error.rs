//! Wire error envelope and the correlation-id extractor.

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use keygate_core::CorrelationId;
use keygate_error::{Error, HttpClass};
use serde::Serialize;

pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "errorCode")]
    pub error_code: &'static str,
    pub message: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Classified error plus the request id it belongs to.
#[derive(Debug)]
pub struct ApiError {
    pub error: Error,
    pub request_id: CorrelationId,
}

impl ApiError {
    pub fn new(error: impl Into<Error>, request_id: &CorrelationId) -> Self {
        Self {
            error: error.into(),
            request_id: request_id.clone(),
        }
    }
}

pub fn status_for(error: &Error) -> StatusCode {
    match error.kind.http_class() {
        HttpClass::BadRequest => StatusCode::BAD_REQUEST,
        HttpClass::Unauthorized => StatusCode::UNAUTHORIZED,
        HttpClass::Forbidden => StatusCode::FORBIDDEN,
        HttpClass::NotFound => StatusCode::NOT_FOUND,
        HttpClass::Conflict => StatusCode::CONFLICT,
        HttpClass::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        HttpClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        if status.is_server_error() {
            tracing::error!(
                request_id = %self.request_id,
                code = self.error.code(),
                message = %self.error.message,
                "request failed"
            );
        } else {
            tracing::warn!(
                request_id = %self.request_id,
                code = self.error.code(),
                "request rejected"
            );
        }

        let body = ErrorBody {
            error_code: self.error.code(),
            message: self.error.message,
            request_id: self.request_id.to_string(),
            timestamp: chrono::Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

/// Extracts the inbound `X-Correlation-ID`, generating one when absent.
#[derive(Debug, Clone)]
pub struct Correlation(pub CorrelationId);

impl<S: Send + Sync> FromRequestParts<S> for Correlation {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(CorrelationId::generate, CorrelationId::from_header);
        Ok(Self(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&Error::validation("x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::authentication("x")),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&Error::rotation_conflict("x")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::dependency_unavailable("x")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_envelope_field_names() {
        let body = ErrorBody {
            error_code: "AUTH_ERROR",
            message: "invalid client credentials".into(),
            request_id: "req-1".into(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"errorCode\":\"AUTH_ERROR\""));
        assert!(json.contains("\"requestId\":\"req-1\""));
    }
}
