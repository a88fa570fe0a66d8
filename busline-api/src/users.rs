use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use busline_core::models::{Passenger, PassengerDetails, Reservation};
use busline_identity::{DeletedAccount, UserProfile};
use busline_shared::Masked;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    middleware::{AdminCaller, Caller},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub old_password: Masked<String>,
    pub new_password: Masked<String>,
}

#[derive(Debug, Serialize)]
struct Count {
    count: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users/me", get(my_profile))
        .route("/v1/users/by-email/{email}", get(profile))
        .route("/v1/users/by-email/{email}/password", put(change_password))
        .route("/v1/users/{id}", delete(delete_account))
        .route("/v1/users/{id}/passenger", put(upsert_passenger))
        .route("/v1/users/{id}/reservations", get(user_reservations))
        .route("/v1/passengers", get(list_passengers))
        .route("/v1/passengers/count", get(count_passengers))
}

async fn my_profile(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<UserProfile>, AppError> {
    let subject = caller.subject.clone();
    Ok(Json(state.accounts.user_profile(&caller, &subject).await?))
}

async fn profile(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(email): Path<String>,
) -> Result<Json<UserProfile>, AppError> {
    Ok(Json(state.accounts.user_profile(&caller, &email).await?))
}

async fn change_password(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(email): Path<String>,
    Json(req): Json<PasswordChange>,
) -> Result<StatusCode, AppError> {
    state
        .accounts
        .change_password(&caller, &email, req.old_password.expose(), req.new_password.expose())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_account(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<i64>,
) -> Result<Json<DeletedAccount>, AppError> {
    Ok(Json(state.accounts.delete_account(&caller, id).await?))
}

async fn upsert_passenger(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<i64>,
    Json(details): Json<PassengerDetails>,
) -> Result<Json<Passenger>, AppError> {
    Ok(Json(state.accounts.upsert_passenger(&caller, id, details).await?))
}

async fn user_reservations(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Reservation>>, AppError> {
    Ok(Json(state.ledger.reservations_for_user(&caller, id).await?))
}

async fn list_passengers(
    State(state): State<AppState>,
    AdminCaller(caller): AdminCaller,
) -> Result<Json<Vec<Passenger>>, AppError> {
    Ok(Json(state.accounts.list_passengers(&caller).await?))
}

async fn count_passengers(
    State(state): State<AppState>,
    AdminCaller(caller): AdminCaller,
) -> Result<Json<Count>, AppError> {
    let count = state.accounts.count_passengers(&caller).await?;
    Ok(Json(Count { count }))
}
