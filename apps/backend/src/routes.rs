//! Internal HTTP surface.

use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use keygate_auth::VerificationOutcome;
use keygate_core::CorrelationId;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

/// Header carrying a transparently renewed token back to the caller.
pub const RENEWED_TOKEN_HEADER: &str = "X-Renewed-Token";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/internal/v1/tokens/validate", post(validate_token))
        .route("/internal/v1/tokens/renew", post(renew_token))
        .route("/internal/v1/payments", post(process_payment))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub token_string: String,
    pub required_permission: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewRequest {
    pub token_string: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub is_valid: bool,
    pub is_expired: bool,
    pub is_forbidden: bool,
    pub is_renewed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewed_token_string: Option<String>,
}

impl From<VerificationOutcome> for ValidateResponse {
    fn from(outcome: VerificationOutcome) -> Self {
        Self {
            is_valid: outcome.is_valid,
            is_expired: outcome.is_expired,
            is_forbidden: outcome.is_forbidden,
            is_renewed: outcome.is_renewed,
            error_message: outcome.error_message,
            renewed_token_string: outcome.renewed_token,
        }
    }
}

async fn validate_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ValidateRequest>,
) -> Json<ValidateResponse> {
    let correlation_id = correlation_from(&headers);
    let outcome = state
        .verifier
        .verify(
            &body.token_string,
            body.required_permission.as_deref(),
            &correlation_id,
        )
        .await;
    Json(outcome.into())
}

async fn renew_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RenewRequest>,
) -> Json<ValidateResponse> {
    let correlation_id = correlation_from(&headers);
    let outcome = state
        .verifier
        .verify(&body.token_string, None, &correlation_id)
        .await;
    Json(outcome.into())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentReceipt {
    status: &'static str,
    reference: Option<String>,
    processed_at: chrono::DateTime<chrono::Utc>,
}

/// Business processing target. The processing itself is a stub; what
/// matters here is the token gate in front of it.
async fn process_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let correlation_id = correlation_from(&headers);
    let Some(token) = bearer_token(&headers) else {
        return reject(StatusCode::UNAUTHORIZED, "missing bearer token", &correlation_id);
    };

    let outcome = state
        .verifier
        .verify(token, Some("payments:execute"), &correlation_id)
        .await;

    if outcome.is_forbidden {
        return reject(StatusCode::FORBIDDEN, "permission denied", &correlation_id);
    }
    if !outcome.is_valid {
        let message = outcome
            .error_message
            .unwrap_or_else(|| "token rejected".into());
        return reject(StatusCode::UNAUTHORIZED, &message, &correlation_id);
    }

    let receipt = PaymentReceipt {
        status: "processed",
        reference: body
            .get("reference")
            .and_then(|v| v.as_str())
            .map(str::to_owned),
        processed_at: chrono::Utc::now(),
    };

    let mut response = (StatusCode::OK, Json(receipt)).into_response();
    if let Some(renewed) = outcome.renewed_token {
        if let Ok(value) = header::HeaderValue::from_str(&renewed) {
            response.headers_mut().insert(RENEWED_TOKEN_HEADER, value);
        }
    }
    response
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    #[serde(rename = "errorCode")]
    error_code: &'static str,
    message: String,
    #[serde(rename = "requestId")]
    request_id: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

fn reject(status: StatusCode, message: &str, correlation_id: &CorrelationId) -> Response {
    let error_code = match status {
        StatusCode::FORBIDDEN => "FORBIDDEN",
        StatusCode::UNAUTHORIZED => "AUTH_ERROR",
        _ => "INTERNAL_ERROR",
    };
    tracing::warn!(request_id = %correlation_id, code = error_code, "request rejected");
    (
        status,
        Json(ErrorBody {
            error_code,
            message: message.to_owned(),
            request_id: correlation_id.to_string(),
            timestamp: chrono::Utc::now(),
        }),
    )
        .into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn correlation_from(headers: &HeaderMap) -> CorrelationId {
    headers
        .get("X-Correlation-ID")
        .and_then(|v| v.to_str().ok())
        .map_or_else(CorrelationId::generate, CorrelationId::from_header)
}
