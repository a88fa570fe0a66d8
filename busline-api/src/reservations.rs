use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use busline_booking::ReservationRequest;
use busline_core::models::Reservation;
use serde::Serialize;

use crate::{error::AppError, middleware::Caller, state::AppState};

#[derive(Debug, Serialize)]
struct ActiveCount {
    count: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", get(all_reservations).post(add_reservation))
        .route("/v1/reservations/me", get(my_reservations))
        .route("/v1/reservations/today/count", get(count_today))
        .route(
            "/v1/reservations/{id}",
            get(view_reservation)
                .put(update_reservation)
                .delete(delete_reservation),
        )
}

async fn add_reservation(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<ReservationRequest>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    let reservation = state.ledger.add_reservation(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

async fn all_reservations(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Reservation>>, AppError> {
    Ok(Json(state.ledger.all_reservations(&caller).await?))
}

async fn my_reservations(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Reservation>>, AppError> {
    Ok(Json(state.ledger.reservations_for_caller(&caller).await?))
}

async fn count_today(
    State(state): State<AppState>,
    _caller: Caller,
) -> Result<Json<ActiveCount>, AppError> {
    let count = state.ledger.count_active_today().await?;
    Ok(Json(ActiveCount { count }))
}

async fn view_reservation(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<i64>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.ledger.view_reservation(&caller, id).await?))
}

async fn update_reservation(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<i64>,
    Json(request): Json<ReservationRequest>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.ledger.update_reservation(&caller, id, request).await?))
}

async fn delete_reservation(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<i64>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.ledger.delete_reservation(&caller, id).await?))
}
