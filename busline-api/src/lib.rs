use axum::{
    http::{header, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod buses;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod reservations;
pub mod routes;
pub mod state;
pub mod users;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::USER_AGENT]);

    let admin_only = admin::routes()
        .merge(notifications::admin_routes())
        .route_layer(from_fn(middleware::admin_middleware));

    let protected = Router::new()
        .merge(auth::protected_routes())
        .merge(users::routes())
        .merge(routes::routes())
        .merge(buses::routes())
        .merge(reservations::routes())
        .merge(notifications::routes())
        .merge(admin_only)
        .route_layer(from_fn_with_state(state.clone(), middleware::token_middleware));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(auth::routes())
        .merge(protected)
        .layer(from_fn(error::attach_error_details))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
