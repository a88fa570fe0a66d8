use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use busline_api::{app, AppState};
use busline_store::{app_config::AuthConfig, MemoryStore};
use chrono::Duration;
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN_EMAIL: &str = "ops@busline.test";
const ADMIN_PASSWORD: &str = "ops-password";

async fn setup() -> Router {
    let auth = AuthConfig {
        jwt_secret: "integration-secret".into(),
        jwt_expiration_seconds: 3600,
    };
    let state = AppState::with_store(Arc::new(MemoryStore::new()), &auth, 16);
    state
        .accounts
        .ensure_admin(ADMIN_EMAIL, ADMIN_PASSWORD, "ops")
        .await
        .unwrap();
    app(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn admin_token(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/v1/auth/admin/login",
        None,
        Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "ADMIN");
    body["token"].as_str().unwrap().to_string()
}

async fn rider_token(app: &Router, email: &str) -> String {
    let (status, _) = send(
        app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({
            "email": email,
            "password": "rider-password",
            "first_name": "Sita",
            "last_name": "Sharma"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": "rider-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

fn tomorrow() -> String {
    (busline_core::today() + Duration::days(1)).to_string()
}

/// Route Kathmandu -> Pokhara with one 40-seat bus leaving tomorrow at 08:00.
async fn seed_inventory(app: &Router, admin: &str) -> i64 {
    let (status, _) = send(
        app,
        Method::POST,
        "/v1/routes",
        Some(admin),
        Some(json!({ "route_from": "Kathmandu", "route_to": "Pokhara", "distance": 200 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, bus) = send(
        app,
        Method::POST,
        "/v1/buses",
        Some(admin),
        Some(json!({
            "route_from": "Kathmandu",
            "route_to": "Pokhara",
            "bus_name": "Greenline",
            "driver_name": "Hari",
            "bus_type": "AC",
            "journey_date": tomorrow(),
            "departure_time": "08:00:00",
            "arrival_time": "15:00:00",
            "total_seats": 40,
            "fare": 1500
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(bus["available_seats"], 40);
    bus["id"].as_i64().unwrap()
}

fn booking(seats: i32) -> Value {
    json!({
        "departure_location": "Kathmandu",
        "destination": "Pokhara",
        "journey_date": tomorrow(),
        "booked_seat": seats
    })
}

#[tokio::test]
async fn test_health_is_open() {
    let app = setup().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_then_login() {
    let app = setup().await;
    let (status, user) = send(
        &app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({ "email": "ram@busline.test", "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["email"], "ram@busline.test");
    assert!(user.get("password_hash").is_none());

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({ "email": "ram@busline.test", "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "USER");

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({ "email": "ram@busline.test", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = setup().await;
    rider_token(&app, "dup@busline.test").await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({ "email": "dup@busline.test", "password": "other" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "DUPLICATE_EMAIL");
}

#[tokio::test]
async fn test_missing_token_is_rejected_with_request_path() {
    let app = setup().await;
    let (status, body) = send(&app, Method::GET, "/v1/routes", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "MALFORMED_HEADER");
    assert_eq!(body["details"], "uri=/v1/routes");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let app = setup().await;
    let (status, body) = send(&app, Method::GET, "/v1/buses", Some("not.a.jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_riders_cannot_touch_inventory_or_admins() {
    let app = setup().await;
    let rider = rider_token(&app, "rider@busline.test").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/routes",
        Some(&rider),
        Some(json!({ "route_from": "A", "route_to": "B", "distance": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "ACCESS_DENIED");
    assert_eq!(body["details"], "uri=/v1/routes");

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/admins",
        Some(&rider),
        Some(json!({ "user_name": "x", "email": "x@busline.test", "password": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_booking_decrements_seats_and_cancel_restores_them() {
    let app = setup().await;
    let admin = admin_token(&app).await;
    let bus_id = seed_inventory(&app, &admin).await;
    let rider = rider_token(&app, "book@busline.test").await;

    let (status, reservation) =
        send(&app, Method::POST, "/v1/reservations", Some(&rider), Some(booking(2))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reservation["status"], "SUCCESSFUL");
    assert_eq!(reservation["fare"], 3000);
    assert_eq!(reservation["bus_id"], bus_id);

    let bus_uri = format!("/v1/buses/{}", bus_id);
    let (_, bus) = send(&app, Method::GET, &bus_uri, Some(&rider), None).await;
    assert_eq!(bus["available_seats"], 38);

    let (status, mine) = send(&app, Method::GET, "/v1/reservations/me", Some(&rider), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().map(Vec::len), Some(1));

    let uri = format!("/v1/reservations/{}", reservation["id"]);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&rider), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, bus) = send(&app, Method::GET, &bus_uri, Some(&rider), None).await;
    assert_eq!(bus["available_seats"], 40);
}

#[tokio::test]
async fn test_overbooking_is_a_client_error() {
    let app = setup().await;
    let admin = admin_token(&app).await;
    seed_inventory(&app, &admin).await;
    let rider = rider_token(&app, "greedy@busline.test").await;

    let (status, body) =
        send(&app, Method::POST, "/v1/reservations", Some(&rider), Some(booking(41))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INSUFFICIENT_SEATS");
    assert_eq!(body["details"], "uri=/v1/reservations");
}

#[tokio::test]
async fn test_other_riders_cannot_read_a_reservation() {
    let app = setup().await;
    let admin = admin_token(&app).await;
    seed_inventory(&app, &admin).await;
    let owner = rider_token(&app, "owner@busline.test").await;
    let snoop = rider_token(&app, "snoop@busline.test").await;

    let (_, reservation) =
        send(&app, Method::POST, "/v1/reservations", Some(&owner), Some(booking(1))).await;
    let uri = format!("/v1/reservations/{}", reservation["id"]);

    let (status, _) = send(&app, Method::GET, &uri, Some(&snoop), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_booked_bus_cannot_be_deleted() {
    let app = setup().await;
    let admin = admin_token(&app).await;
    let bus_id = seed_inventory(&app, &admin).await;
    let rider = rider_token(&app, "seat@busline.test").await;
    send(&app, Method::POST, "/v1/reservations", Some(&rider), Some(booking(1))).await;

    let uri = format!("/v1/buses/{}", bus_id);
    let (status, body) = send(&app, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "SEATS_ALREADY_SCHEDULED");
}

#[tokio::test]
async fn test_delay_reschedules_and_reports_recipients() {
    let app = setup().await;
    let admin = admin_token(&app).await;
    let bus_id = seed_inventory(&app, &admin).await;
    let rider = rider_token(&app, "late@busline.test").await;
    send(&app, Method::POST, "/v1/reservations", Some(&rider), Some(booking(1))).await;
    send(&app, Method::POST, "/v1/reservations", Some(&rider), Some(booking(1))).await;

    let uri = format!("/v1/buses/{}/delay", bus_id);
    let (status, event) = send(
        &app,
        Method::POST,
        &uri,
        Some(&admin),
        Some(json!({ "minutes": 30 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event["bus_id"], bus_id);
    assert_eq!(event["delivered"], 1);
    assert_eq!(event["failed"], 0);

    let (_, bus) = send(&app, Method::GET, &format!("/v1/buses/{}", bus_id), Some(&rider), None).await;
    assert_eq!(bus["departure_time"], "08:00:00");
    assert_eq!(bus["delay_minutes"], 30);

    // Existing bookings still resolve to the delayed bus.
    let (status, _) = send(&app, Method::POST, "/v1/reservations", Some(&rider), Some(booking(1))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_extractor_rejections_get_an_error_body() {
    let app = setup().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({ "email": "a@b.c" })),
    )
    .await;
    assert!(status.is_client_error());
    assert_eq!(body["error"], "BAD_REQUEST");
    assert!(body["message"].as_str().unwrap().contains("password"));
    assert_eq!(body["details"], "uri=/v1/auth/register");
    assert!(body["timestamp"].is_string());

    let admin = admin_token(&app).await;
    let (status, body) = send(&app, Method::GET, "/v1/buses/not-a-number", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
    assert_eq!(body["details"], "uri=/v1/buses/not-a-number");
}

#[tokio::test]
async fn test_search_finds_bus_by_partial_endpoint() {
    let app = setup().await;
    let admin = admin_token(&app).await;
    seed_inventory(&app, &admin).await;
    let rider = rider_token(&app, "search@busline.test").await;

    let (status, found) = send(
        &app,
        Method::GET,
        "/v1/buses/search?route_from=kath",
        Some(&rider),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found.as_array().map(Vec::len), Some(1));
}
