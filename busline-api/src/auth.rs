use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use busline_core::models::User;
use busline_identity::{LoginOutcome, Registration};
use busline_shared::Masked;
use serde::Deserialize;

use crate::{error::AppError, middleware::Caller, state::AppState};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: Masked<String>,
}

/// Open endpoints: registration and both logins.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/register", post(register))
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/admin/login", post(admin_login))
}

/// Needs a valid token; nothing is stored server side.
pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/v1/auth/logout", post(logout))
}

async fn register(
    State(state): State<AppState>,
    Json(candidate): Json<Registration>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state.accounts.register(candidate).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginOutcome>, AppError> {
    let outcome = state.accounts.authenticate(&req.email, req.password.expose()).await?;
    Ok(Json(outcome))
}

async fn admin_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginOutcome>, AppError> {
    let outcome = state
        .accounts
        .authenticate_admin(&req.email, req.password.expose())
        .await?;
    Ok(Json(outcome))
}

async fn logout(Caller(token): Caller) -> StatusCode {
    tracing::info!(entity_id = token.entity_id, roles = %token.role_label(), "logged out");
    StatusCode::NO_CONTENT
}
