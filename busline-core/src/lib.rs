pub mod identity;
pub mod models;
pub mod notify;
pub mod repository;

pub use identity::{AccessToken, Role};
pub use notify::{destination_for, Notifier};

use chrono::{NaiveDate, Utc};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("An account with the email {0} already exists")]
    DuplicateEmail(String),
    #[error("Route from {from} to {to} already exists")]
    DuplicateRoute { from: String, to: String },
    #[error("The bus already exists on this route")]
    DuplicateBusOnRoute,
    #[error("{0}")]
    NotFound(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Admin not found: {0}")]
    AdminNotFound(String),
    #[error("Passenger not found for user {0}")]
    PassengerNotFound(i64),
    #[error("Bus not found: {0}")]
    BusNotFound(String),
    #[error("Route not found: {0}")]
    RouteNotFound(String),
    #[error("Reservation not found with id {0}")]
    ReservationNotFound(i64),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Authorization header must use the Bearer scheme")]
    MalformedHeader,
    #[error("Invalid access token: {0}")]
    InvalidToken(String),
    #[error("Access denied")]
    AccessDenied,
    #[error("Bus {0} already has scheduled seats")]
    SeatsAlreadyScheduled(i64),
    #[error("Route {0} still has buses scheduled")]
    RouteHasBuses(i64),
    #[error("Only {available} seats are available, {requested} requested")]
    InsufficientSeats { requested: i32, available: i32 },
    #[error("Journey date {0} is in the past")]
    InvalidJourneyDate(NaiveDate),
    #[error("Journey on {0} has already taken place")]
    PastJourney(NaiveDate),
    #[error("Passenger details are required before booking")]
    PassengerDetailsMissing,
    #[error("No active reservations for today")]
    NoActiveReservations,
    #[error("No reservations found for this user")]
    NoReservationsForUser,
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl From<repository::RepoError> for CoreError {
    fn from(err: repository::RepoError) -> Self {
        CoreError::Storage(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Calendar date used for every "in the past" comparison.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_fold_into_core_error() {
        let err: repository::RepoError = "connection reset".into();
        let core: CoreError = err.into();
        assert!(matches!(core, CoreError::Storage(ref m) if m == "connection reset"));
    }

    #[test]
    fn test_seat_shortage_message_names_both_counts() {
        let err = CoreError::InsufficientSeats {
            requested: 3,
            available: 2,
        };
        assert_eq!(err.to_string(), "Only 2 seats are available, 3 requested");
    }
}
