use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use busline_core::models::{NewRoute, Route, RoutePatch};
use serde::Serialize;

use crate::{
    error::AppError,
    middleware::{AdminCaller, Caller},
    state::AppState,
};

#[derive(Debug, Serialize)]
struct RouteCount {
    count: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/routes", get(list_routes).post(add_route))
        .route("/v1/routes/count", get(count_routes))
        .route(
            "/v1/routes/{id}",
            get(view_route).put(update_route).delete(delete_route),
        )
}

async fn list_routes(
    State(state): State<AppState>,
    _caller: Caller,
) -> Result<Json<Vec<Route>>, AppError> {
    Ok(Json(state.routes.list_all_routes().await?))
}

async fn count_routes(
    State(state): State<AppState>,
    _caller: Caller,
) -> Result<Json<RouteCount>, AppError> {
    let count = state.routes.count_routes().await?;
    Ok(Json(RouteCount { count }))
}

async fn view_route(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(state.routes.view_route(id).await?))
}

async fn add_route(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Json(route): Json<NewRoute>,
) -> Result<(StatusCode, Json<Route>), AppError> {
    let route = state.routes.add_route(route).await?;
    Ok((StatusCode::CREATED, Json(route)))
}

async fn update_route(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
    Json(patch): Json<RoutePatch>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(state.routes.update_route(id, patch).await?))
}

async fn delete_route(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(state.routes.delete_route(id).await?))
}
