//! Legacy header-authenticated business endpoint.

use crate::error::{ApiError, Correlation};
use crate::routes::auth::parse_client_id;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use keygate_auth::RequestContext;
use keygate_core::SecretString;
use keygate_error::Error;

const CLIENT_ID_HEADER: &str = "X-Client-ID";
const CLIENT_SECRET_HEADER: &str = "X-Client-Secret";

/// `POST /api/v1/payments`: authenticate the legacy headers, swap them for
/// a bearer token, forward to the backend and relay its answer verbatim.
pub async fn submit_payment(
    State(state): State<AppState>,
    Correlation(correlation_id): Correlation,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    let client_id = header_value(&headers, CLIENT_ID_HEADER, &correlation_id)?;
    let client_id = parse_client_id(&client_id, &correlation_id)?;
    let secret = SecretString::new(header_value(&headers, CLIENT_SECRET_HEADER, &correlation_id)?);

    let mut ctx = RequestContext::new(correlation_id.clone());
    if let Some(source) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        ctx = ctx.with_source(source);
    }

    let issued = state
        .auth
        .authenticate(&client_id, &secret, &ctx)
        .await
        .map_err(|e| ApiError::new(e, &correlation_id))?;

    let forwarded = state
        .forwarder
        .post("/internal/v1/payments", &issued.token, &correlation_id, body)
        .await
        .map_err(|e| ApiError::new(e, &correlation_id))?;

    let status =
        StatusCode::from_u16(forwarded.status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok((status, Json(forwarded.body)).into_response())
}

fn header_value(
    headers: &HeaderMap,
    name: &'static str,
    correlation_id: &keygate_core::CorrelationId,
) -> Result<String, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            ApiError::new(
                Error::validation(format!("missing or malformed {name} header")),
                correlation_id,
            )
        })
}
