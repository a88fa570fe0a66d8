use axum::{
    body::to_bytes,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use busline_core::CoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    Core(CoreError),
    BadRequest(String),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

/// Error payload; `details` is filled in by [`attach_error_details`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub timestamp: DateTime<Utc>,
    pub error: &'static str,
    pub message: String,
    pub details: String,
}

pub fn classify(err: &CoreError) -> (StatusCode, &'static str) {
    use CoreError::*;
    match err {
        DuplicateEmail(_) => (StatusCode::CONFLICT, "DUPLICATE_EMAIL"),
        DuplicateRoute { .. } => (StatusCode::CONFLICT, "DUPLICATE_ROUTE"),
        DuplicateBusOnRoute => (StatusCode::CONFLICT, "DUPLICATE_BUS_ON_ROUTE"),
        NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
        AdminNotFound(_) => (StatusCode::NOT_FOUND, "ADMIN_NOT_FOUND"),
        PassengerNotFound(_) => (StatusCode::NOT_FOUND, "PASSENGER_NOT_FOUND"),
        BusNotFound(_) => (StatusCode::NOT_FOUND, "BUS_NOT_FOUND"),
        RouteNotFound(_) => (StatusCode::NOT_FOUND, "ROUTE_NOT_FOUND"),
        ReservationNotFound(_) => (StatusCode::NOT_FOUND, "RESERVATION_NOT_FOUND"),
        NoActiveReservations => (StatusCode::NOT_FOUND, "NO_ACTIVE_RESERVATIONS"),
        NoReservationsForUser => (StatusCode::NOT_FOUND, "NO_RESERVATIONS_FOR_USER"),
        InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
        MalformedHeader => (StatusCode::UNAUTHORIZED, "MALFORMED_HEADER"),
        InvalidToken(_) => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
        AccessDenied => (StatusCode::FORBIDDEN, "ACCESS_DENIED"),
        SeatsAlreadyScheduled(_) => (StatusCode::BAD_REQUEST, "SEATS_ALREADY_SCHEDULED"),
        RouteHasBuses(_) => (StatusCode::BAD_REQUEST, "ROUTE_HAS_BUSES"),
        InsufficientSeats { .. } => (StatusCode::BAD_REQUEST, "INSUFFICIENT_SEATS"),
        InvalidJourneyDate(_) => (StatusCode::BAD_REQUEST, "INVALID_JOURNEY_DATE"),
        PastJourney(_) => (StatusCode::BAD_REQUEST, "PAST_JOURNEY"),
        PassengerDetailsMissing => (StatusCode::BAD_REQUEST, "PASSENGER_DETAILS_MISSING"),
        Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
        Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Core(CoreError::Storage(msg)) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal Server Error".to_string())
            }
            AppError::Core(err) => {
                let (status, code) = classify(&err);
                (status, code, err.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
        };

        let body = ErrorBody {
            timestamp: Utc::now(),
            error: code,
            message,
            details: String::new(),
        };
        let mut response = (status, Json(body.clone())).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

const REJECTION_BODY_LIMIT: usize = 64 * 1024;

/// Code for failures produced outside the handlers: extractor rejections,
/// unknown paths, wrong methods.
fn rejection_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::METHOD_NOT_ALLOWED => "METHOD_NOT_ALLOWED",
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        status if status.is_server_error() => "INTERNAL",
        _ => "BAD_REQUEST",
    }
}

/// Re-render every error response as an [`ErrorBody`] carrying the request
/// path. Bodies from `AppError` are reused; plain-text rejections become the
/// message of a fresh one.
pub async fn attach_error_details(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let mut response = next.run(req).await;
    let status = response.status();
    let attached = response.extensions_mut().remove::<ErrorBody>();

    let body = match attached {
        Some(body) => body,
        None if status.is_client_error() || status.is_server_error() => {
            let bytes = to_bytes(response.into_body(), REJECTION_BODY_LIMIT)
                .await
                .unwrap_or_default();
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            let message = if text.is_empty() {
                status.canonical_reason().unwrap_or("Error").to_string()
            } else {
                text
            };
            tracing::debug!(%status, %path, "rejected request: {}", message);
            ErrorBody {
                timestamp: Utc::now(),
                error: rejection_code(status),
                message,
                details: String::new(),
            }
        }
        None => return response,
    };

    let body = ErrorBody {
        details: format!("uri={}", path),
        ..body
    };
    (status, Json(body)).into_response()
}
