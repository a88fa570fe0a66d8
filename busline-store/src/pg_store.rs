//! Postgres adapter. One struct backs every repository port; the impls live
//! in `user_repo`, `inventory_repo` and `reservation_repo`.

use std::collections::BTreeSet;

use busline_core::models::{Admin, Bus, Passenger, Reservation, ReservationStatus, Route, User};
use busline_core::repository::{DuplicateKey, RepoError, RepoResult};
use busline_core::Role;
use busline_shared::Masked;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;

use crate::database::DbClient;

#[derive(Clone)]
pub struct PgStore {
    pub(crate) pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl From<&DbClient> for PgStore {
    fn from(db: &DbClient) -> Self {
        Self::new(db.pool.clone())
    }
}

/// Folds a unique-constraint violation into [`DuplicateKey`]; anything else
/// passes through as a plain storage error.
pub(crate) fn unique_violation(key: &str) -> impl Fn(sqlx::Error) -> RepoError + '_ {
    move |err| {
        let unique = err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());
        if unique {
            DuplicateKey::boxed(key)
        } else {
            err.into()
        }
    }
}

// Internal structs for type-safe querying

pub(crate) const USER_COLUMNS: &str = r#"
    u.id, u.email, u.password_hash, u.user_name, u.first_name, u.last_name,
    u.phone_number, u.created_at,
    ARRAY(
        SELECT r.name FROM user_roles ur JOIN roles r ON r.id = ur.role_id
        WHERE ur.user_id = u.id ORDER BY r.name
    ) AS roles
"#;

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    user_name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone_number: Option<String>,
    created_at: DateTime<Utc>,
    roles: Vec<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let roles: BTreeSet<Role> = row.roles.iter().filter_map(|r| Role::parse(r)).collect();
        User {
            id: row.id,
            email: row.email,
            password_hash: Masked(row.password_hash),
            user_name: row.user_name,
            first_name: row.first_name,
            last_name: row.last_name,
            phone_number: row.phone_number,
            roles,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PassengerRow {
    id: i64,
    user_id: i64,
    first_name: String,
    last_name: String,
    phone_number: Option<String>,
}

impl From<PassengerRow> for Passenger {
    fn from(row: PassengerRow) -> Self {
        Passenger {
            id: row.id,
            user_id: row.user_id,
            first_name: row.first_name,
            last_name: row.last_name,
            phone_number: row.phone_number,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AdminRow {
    id: i64,
    user_name: String,
    email: String,
    password_hash: String,
}

impl From<AdminRow> for Admin {
    fn from(row: AdminRow) -> Self {
        Admin {
            id: row.id,
            user_name: row.user_name,
            email: row.email,
            password_hash: Masked(row.password_hash),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RouteRow {
    id: i64,
    route_from: String,
    route_to: String,
    distance: i32,
}

impl From<RouteRow> for Route {
    fn from(row: RouteRow) -> Self {
        Route {
            id: row.id,
            route_from: row.route_from,
            route_to: row.route_to,
            distance: row.distance,
        }
    }
}

pub(crate) const BUS_SELECT: &str = r#"
    SELECT b.id, b.route_id, r.route_from, r.route_to, b.bus_name, b.driver_name,
           b.bus_type, b.journey_date, b.departure_time, b.arrival_time,
           b.total_seats, b.available_seats, b.fare, b.delay_minutes
    FROM buses b JOIN routes r ON r.id = b.route_id
"#;

#[derive(sqlx::FromRow)]
pub(crate) struct BusRow {
    id: i64,
    route_id: i64,
    route_from: String,
    route_to: String,
    bus_name: String,
    driver_name: String,
    bus_type: String,
    journey_date: Option<NaiveDate>,
    departure_time: Option<NaiveTime>,
    arrival_time: Option<NaiveTime>,
    total_seats: i32,
    available_seats: i32,
    fare: i32,
    delay_minutes: i32,
}

impl From<BusRow> for Bus {
    fn from(row: BusRow) -> Self {
        Bus {
            id: row.id,
            route_id: row.route_id,
            route_from: row.route_from,
            route_to: row.route_to,
            bus_name: row.bus_name,
            driver_name: row.driver_name,
            bus_type: row.bus_type,
            journey_date: row.journey_date,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            total_seats: row.total_seats,
            available_seats: row.available_seats,
            fare: row.fare,
            delay_minutes: row.delay_minutes,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ReservationRow {
    id: i64,
    passenger_id: i64,
    bus_id: i64,
    departure_location: String,
    destination: String,
    journey_date: NaiveDate,
    booked_seat: i32,
    fare: i64,
    status: String,
    booked_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = busline_core::repository::RepoError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let status = ReservationStatus::parse(&row.status)
            .ok_or_else(|| format!("unknown reservation status {}", row.status))?;
        Ok(Reservation {
            id: row.id,
            passenger_id: row.passenger_id,
            bus_id: row.bus_id,
            departure_location: row.departure_location,
            destination: row.destination,
            journey_date: row.journey_date,
            booked_seat: row.booked_seat,
            fare: row.fare,
            status,
            booked_at: row.booked_at,
        })
    }
}

pub(crate) fn reservations(rows: Vec<ReservationRow>) -> RepoResult<Vec<Reservation>> {
    rows.into_iter().map(Reservation::try_from).collect()
}
