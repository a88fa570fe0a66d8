use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{
    Admin, BookingOutcome, Bus, NewAdmin, NewBus, NewRoute, NewUser, Passenger, PassengerDetails,
    Reservation, ReservationDraft, Route, User,
};

pub type RepoError = Box<dyn std::error::Error + Send + Sync>;
pub type RepoResult<T> = Result<T, RepoError>;

/// Raised by a store when a write collides with a unique key (email, route
/// endpoints). Services turn it into the matching duplicate error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate key: {0}")]
pub struct DuplicateKey(pub String);

impl DuplicateKey {
    pub fn boxed(key: impl Into<String>) -> RepoError {
        Box::new(DuplicateKey(key.into()))
    }
}

pub fn is_duplicate(err: &RepoError) -> bool {
    err.downcast_ref::<DuplicateKey>().is_some()
}

/// Users and their one-to-one passenger profiles.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, id: i64) -> RepoResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    /// Insert a user, and its passenger profile when `passenger` is given.
    /// A taken email fails with [`DuplicateKey`].
    async fn insert_user(
        &self,
        user: NewUser,
        passenger: Option<PassengerDetails>,
    ) -> RepoResult<User>;

    async fn update_password(&self, user_id: i64, password_hash: &str) -> RepoResult<bool>;

    /// Remove a user together with its passenger and reservations, crediting
    /// the reservations' seats back to their buses. `None` if the user is unknown.
    async fn delete_user(&self, id: i64) -> RepoResult<Option<Vec<Reservation>>>;

    async fn find_passenger(&self, id: i64) -> RepoResult<Option<Passenger>>;

    async fn find_passenger_by_user(&self, user_id: i64) -> RepoResult<Option<Passenger>>;

    async fn upsert_passenger(
        &self,
        user_id: i64,
        details: PassengerDetails,
    ) -> RepoResult<Passenger>;

    async fn list_passengers(&self) -> RepoResult<Vec<Passenger>>;

    async fn count_passengers(&self) -> RepoResult<i64>;
}

#[async_trait]
pub trait AdminRepository: Send + Sync {
    async fn find_admin(&self, id: i64) -> RepoResult<Option<Admin>>;

    async fn find_admin_by_email(&self, email: &str) -> RepoResult<Option<Admin>>;

    /// A taken email fails with [`DuplicateKey`].
    async fn insert_admin(&self, admin: NewAdmin) -> RepoResult<Admin>;

    /// `false` when the admin is gone; a taken email fails with [`DuplicateKey`].
    async fn save_admin(&self, admin: &Admin) -> RepoResult<bool>;
}

#[async_trait]
pub trait RouteRepository: Send + Sync {
    async fn find_route(&self, id: i64) -> RepoResult<Option<Route>>;

    async fn find_route_by_endpoints(&self, from: &str, to: &str) -> RepoResult<Option<Route>>;

    async fn list_routes(&self) -> RepoResult<Vec<Route>>;

    /// Taken endpoints fail with [`DuplicateKey`].
    async fn insert_route(&self, route: NewRoute) -> RepoResult<Route>;

    /// `false` when the route is gone or has buses attached; taken endpoints
    /// fail with [`DuplicateKey`].
    async fn save_route(&self, route: &Route) -> RepoResult<bool>;

    async fn delete_route(&self, id: i64) -> RepoResult<bool>;

    async fn count_routes(&self) -> RepoResult<i64>;
}

#[async_trait]
pub trait BusRepository: Send + Sync {
    async fn find_bus(&self, id: i64) -> RepoResult<Option<Bus>>;

    async fn list_buses(&self) -> RepoResult<Vec<Bus>>;

    async fn list_buses_by_type(&self, bus_type: &str) -> RepoResult<Vec<Bus>>;

    /// Buses attached to a route, ordered by id.
    async fn list_buses_on_route(&self, route_id: i64) -> RepoResult<Vec<Bus>>;

    /// Attach a bus to `route` with every seat available.
    async fn insert_bus(&self, route: &Route, bus: NewBus) -> RepoResult<Bus>;

    /// Overwrite the stored bus only while it still has no bookings.
    async fn update_bus_if_unbooked(&self, bus: &Bus) -> RepoResult<bool>;

    async fn delete_bus_if_unbooked(&self, id: i64) -> RepoResult<bool>;

    /// Write the schedule and delay only; seat counters are left alone.
    async fn reschedule_bus(&self, bus: &Bus) -> RepoResult<bool>;

    async fn count_buses(&self) -> RepoResult<i64>;
}

/// Reservation rows plus the seat arithmetic that must move with them.
///
/// `book`, `cancel` and `rebook` are each a single atomic unit: the seat
/// counter of the bus and the reservation row change together or not at all.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn find_reservation(&self, id: i64) -> RepoResult<Option<Reservation>>;

    async fn list_reservations(&self) -> RepoResult<Vec<Reservation>>;

    async fn reservations_for_passenger(&self, passenger_id: i64) -> RepoResult<Vec<Reservation>>;

    async fn reservations_for_bus(&self, bus_id: i64) -> RepoResult<Vec<Reservation>>;

    async fn count_reservations_on(&self, date: NaiveDate) -> RepoResult<i64>;

    /// Debit `draft.booked_seat` seats and insert the reservation.
    async fn book(&self, draft: ReservationDraft) -> RepoResult<BookingOutcome>;

    /// Credit the seats back and delete the row. `None` if the id is unknown.
    async fn cancel(&self, id: i64) -> RepoResult<Option<Reservation>>;

    /// Cancel reservation `id` and book `draft` in its place, keeping the id.
    async fn rebook(&self, id: i64, draft: ReservationDraft) -> RepoResult<BookingOutcome>;
}

/// Every port at once, for adapters that back all of them.
pub trait Store:
    UserRepository + AdminRepository + RouteRepository + BusRepository + ReservationRepository
{
}

impl<T> Store for T where
    T: UserRepository + AdminRepository + RouteRepository + BusRepository + ReservationRepository
{
}
