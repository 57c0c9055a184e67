//! HTTP surface.

mod admin;
mod auth;
mod payments;

use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/auth/token", post(auth::issue_token))
        .route("/api/v1/auth/validate", post(auth::validate_token))
        .route("/api/v1/auth/refresh", post(auth::refresh_token))
        .route("/api/v1/payments", post(payments::submit_payment))
        .route("/admin/v1/rotations", post(admin::initiate))
        .route("/admin/v1/rotations/{client_id}", get(admin::status))
        .route("/admin/v1/rotations/{client_id}/advance", post(admin::advance))
        .route("/admin/v1/rotations/{client_id}/cancel", post(admin::cancel))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
