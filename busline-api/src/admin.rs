use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use busline_core::models::Admin;
use busline_identity::{AdminCandidate, AdminPatch};

use crate::{error::AppError, middleware::Caller, state::AppState};

// ============================================================================
// Admin Accounts
// ============================================================================

/// Mounted behind both the token and the admin middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admins", post(create_admin))
        .route("/v1/admins/{id}", put(update_admin))
}

async fn create_admin(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(candidate): Json<AdminCandidate>,
) -> Result<(StatusCode, Json<Admin>), AppError> {
    let admin = state.accounts.create_admin(&caller, candidate).await?;
    Ok((StatusCode::CREATED, Json(admin)))
}

async fn update_admin(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<i64>,
    Json(patch): Json<AdminPatch>,
) -> Result<Json<Admin>, AppError> {
    Ok(Json(state.accounts.update_admin(&caller, id, patch).await?))
}
