//! Operator surface for credential rotation.

use crate::error::{ApiError, Correlation};
use crate::routes::auth::parse_client_id;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use keygate_error::Error;
use keygate_rotation::RotationRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub client_id: String,
    pub transition_period_minutes: Option<u64>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub rotation_id: String,
    pub client_id: String,
    pub state: String,
    pub transition_period_minutes: u64,
    /// The one and only disclosure of the new raw secret; it exists
    /// nowhere else in plaintext. The operator relays it to the vendor.
    pub new_client_secret: String,
}

pub async fn initiate(
    State(state): State<AppState>,
    Correlation(correlation_id): Correlation,
    Json(body): Json<InitiateRequest>,
) -> Result<(StatusCode, Json<InitiateResponse>), ApiError> {
    let client_id = parse_client_id(&body.client_id, &correlation_id)?;
    let initiated = state
        .rotation
        .initiate(&client_id, body.transition_period_minutes, body.force)
        .await
        .map_err(|e| ApiError::new(e, &correlation_id))?;

    tracing::info!(
        request_id = %correlation_id,
        client_id = %client_id,
        rotation_id = %initiated.record.rotation_id,
        force = body.force,
        "rotation initiated by operator"
    );

    let response = InitiateResponse {
        rotation_id: initiated.record.rotation_id.clone(),
        client_id: client_id.to_string(),
        state: initiated.record.current_state.to_string(),
        transition_period_minutes: initiated.record.transition_period_minutes,
        new_client_secret: initiated.new_secret.expose_secret(str::to_owned),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn status(
    State(state): State<AppState>,
    Correlation(correlation_id): Correlation,
    Path(client_id): Path<String>,
) -> Result<Json<RotationRecord>, ApiError> {
    let client_id = parse_client_id(&client_id, &correlation_id)?;
    let record = state
        .rotation
        .status(&client_id)
        .await
        .map_err(|e| ApiError::new(e, &correlation_id))?
        .ok_or_else(|| {
            ApiError::new(
                Error::not_found(format!("no rotation for '{client_id}'")),
                &correlation_id,
            )
        })?;
    Ok(Json(record))
}

pub async fn advance(
    State(state): State<AppState>,
    Correlation(correlation_id): Correlation,
    Path(client_id): Path<String>,
) -> Result<Json<RotationRecord>, ApiError> {
    let client_id = parse_client_id(&client_id, &correlation_id)?;
    let record = state
        .rotation
        .advance(&client_id)
        .await
        .map_err(|e| ApiError::new(e, &correlation_id))?;
    Ok(Json(record))
}

pub async fn cancel(
    State(state): State<AppState>,
    Correlation(correlation_id): Correlation,
    Path(client_id): Path<String>,
) -> Result<Json<RotationRecord>, ApiError> {
    let client_id = parse_client_id(&client_id, &correlation_id)?;
    let record = state
        .rotation
        .cancel(&client_id)
        .await
        .map_err(|e| ApiError::new(e, &correlation_id))?;
    Ok(Json(record))
}
