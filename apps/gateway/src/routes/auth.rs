//! Token issuance, validation and refresh.

use crate::error::{ApiError, Correlation};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use keygate_auth::RequestContext;
use keygate_core::{ClientId, SecretString};
use keygate_error::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub token_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
}

pub async fn issue_token(
    State(state): State<AppState>,
    Correlation(correlation_id): Correlation,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let client_id = parse_client_id(&body.client_id, &correlation_id)?;
    if body.client_secret.is_empty() {
        return Err(ApiError::new(
            Error::validation("client_secret must not be empty"),
            &correlation_id,
        ));
    }

    let ctx = RequestContext::new(correlation_id.clone());
    let issued = state
        .auth
        .authenticate(&client_id, &body.client_secret, &ctx)
        .await
        .map_err(|e| ApiError::new(e, &correlation_id))?;

    Ok(Json(TokenResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        token_type: "Bearer",
    }))
}

pub async fn validate_token(
    State(state): State<AppState>,
    Correlation(_correlation_id): Correlation,
    Json(body): Json<TokenBody>,
) -> Json<ValidationResponse> {
    Json(ValidationResponse {
        valid: state.auth.validate_token(&body.token).await,
    })
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Correlation(correlation_id): Correlation,
    Json(body): Json<TokenBody>,
) -> Result<Json<TokenResponse>, ApiError> {
    let ctx = RequestContext::new(correlation_id.clone());
    let issued = state
        .auth
        .renew_token(&body.token, &ctx)
        .await
        .map_err(|e| ApiError::new(e, &correlation_id))?;

    Ok(Json(TokenResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        token_type: "Bearer",
    }))
}

pub(crate) fn parse_client_id(
    raw: &str,
    correlation_id: &keygate_core::CorrelationId,
) -> Result<ClientId, ApiError> {
    ClientId::new(raw)
        .map_err(|e| ApiError::new(Error::validation(e.to_string()), correlation_id))
}
