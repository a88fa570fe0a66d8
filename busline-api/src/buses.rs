use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use busline_catalog::BusSearch;
use busline_core::models::{Bus, BusPatch, NewBus};
use busline_shared::BusDelayedEvent;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    middleware::{AdminCaller, Caller},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct DelayRequest {
    pub minutes: i64,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct BusCount {
    count: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/buses", get(list_buses).post(add_bus))
        .route("/v1/buses/count", get(count_buses))
        .route("/v1/buses/search", get(search_buses))
        .route("/v1/buses/type/{bus_type}", get(buses_by_type))
        .route(
            "/v1/buses/{id}",
            get(view_bus).put(update_bus).delete(delete_bus),
        )
        .route("/v1/buses/{id}/delay", post(delay_bus))
}

async fn list_buses(
    State(state): State<AppState>,
    _caller: Caller,
) -> Result<Json<Vec<Bus>>, AppError> {
    Ok(Json(state.buses.list_all_buses().await?))
}

async fn count_buses(
    State(state): State<AppState>,
    _caller: Caller,
) -> Result<Json<BusCount>, AppError> {
    let count = state.buses.count_buses().await?;
    Ok(Json(BusCount { count }))
}

async fn search_buses(
    State(state): State<AppState>,
    _caller: Caller,
    Query(query): Query<BusSearch>,
) -> Result<Json<Vec<Bus>>, AppError> {
    Ok(Json(state.buses.search_buses(&query).await?))
}

async fn buses_by_type(
    State(state): State<AppState>,
    _caller: Caller,
    Path(bus_type): Path<String>,
) -> Result<Json<Vec<Bus>>, AppError> {
    Ok(Json(state.buses.list_buses_by_type(&bus_type).await?))
}

async fn view_bus(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Bus>, AppError> {
    Ok(Json(state.buses.view_bus(id).await?))
}

async fn add_bus(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Json(bus): Json<NewBus>,
) -> Result<(StatusCode, Json<Bus>), AppError> {
    let bus = state.buses.add_bus(bus).await?;
    Ok((StatusCode::CREATED, Json(bus)))
}

async fn update_bus(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
    Json(patch): Json<BusPatch>,
) -> Result<Json<Bus>, AppError> {
    Ok(Json(state.buses.update_bus(id, patch).await?))
}

async fn delete_bus(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
) -> Result<Json<Bus>, AppError> {
    Ok(Json(state.buses.delete_bus(id).await?))
}

/// Push the departure back and tell every booked rider.
async fn delay_bus(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
    Json(req): Json<DelayRequest>,
) -> Result<Json<BusDelayedEvent>, AppError> {
    let bus = state.buses.delay_departure(id, req.minutes).await?;
    let message = req.message.unwrap_or_else(|| {
        format!(
            "Bus {} ({} -> {}) is delayed by {} minutes",
            bus.bus_name, bus.route_from, bus.route_to, req.minutes
        )
    });
    let report = state.relay.notify_delay(bus.id, &message).await?;

    Ok(Json(BusDelayedEvent {
        bus_id: bus.id,
        delay_minutes: req.minutes,
        message,
        delivered: report.delivered,
        failed: report.failed,
        timestamp: chrono::Utc::now().timestamp(),
    }))
}
