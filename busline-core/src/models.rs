use std::collections::BTreeSet;

use busline_shared::Masked;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Role;

// ============================================================================
// Identity records
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Masked<String>,
    pub user_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub roles: BTreeSet<Role>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.as_str().to_string()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Masked<String>,
    pub user_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub roles: BTreeSet<Role>,
}

/// Rider-facing profile, owned one-to-one by a [`User`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passenger {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerDetails {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Admin {
    pub id: i64,
    pub user_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Masked<String>,
}

#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub user_name: String,
    pub email: String,
    pub password_hash: Masked<String>,
}

// ============================================================================
// Inventory records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: i64,
    pub route_from: String,
    pub route_to: String,
    pub distance: i32,
}

impl Route {
    pub fn connects(&self, from: &str, to: &str) -> bool {
        self.route_from == from && self.route_to == to
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRoute {
    pub route_from: String,
    pub route_to: String,
    pub distance: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutePatch {
    pub route_from: Option<String>,
    pub route_to: Option<String>,
    pub distance: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: i64,
    pub route_id: i64,
    pub route_from: String,
    pub route_to: String,
    pub bus_name: String,
    pub driver_name: String,
    pub bus_type: String,
    pub journey_date: Option<NaiveDate>,
    pub departure_time: Option<NaiveTime>,
    pub arrival_time: Option<NaiveTime>,
    pub total_seats: i32,
    pub available_seats: i32,
    pub fare: i32,
    /// Announced delay on top of the timetable. `journey_date` and the times
    /// above stay the booked service date and schedule.
    #[serde(default)]
    pub delay_minutes: i32,
}

impl Bus {
    /// True while no seat on this bus is booked.
    pub fn is_unbooked(&self) -> bool {
        self.available_seats == self.total_seats
    }

    pub fn serves_date(&self, date: NaiveDate) -> bool {
        self.journey_date.map_or(true, |d| d == date)
    }

    /// Expected departure, delay included.
    pub fn departs_at(&self) -> Option<chrono::NaiveDateTime> {
        let scheduled = self.journey_date?.and_time(self.departure_time?);
        Some(scheduled + Duration::minutes(self.delay_minutes.into()))
    }

    pub fn expected_arrival(&self) -> Option<NaiveTime> {
        Some(self.arrival_time? + Duration::minutes(self.delay_minutes.into()))
    }

    /// Equality used for duplicate detection on a route: everything but ids
    /// and the live seat counter.
    pub fn same_service(&self, other: &NewBus) -> bool {
        self.bus_name == other.bus_name
            && self.driver_name == other.driver_name
            && self.bus_type == other.bus_type
            && self.journey_date == other.journey_date
            && self.departure_time == other.departure_time
            && self.arrival_time == other.arrival_time
            && self.total_seats == other.total_seats
            && self.fare == other.fare
    }

    pub fn apply(&mut self, patch: &BusPatch) {
        if let Some(v) = &patch.bus_name {
            self.bus_name = v.clone();
        }
        if let Some(v) = &patch.driver_name {
            self.driver_name = v.clone();
        }
        if let Some(v) = &patch.bus_type {
            self.bus_type = v.clone();
        }
        if let Some(v) = patch.journey_date {
            self.journey_date = Some(v);
            self.delay_minutes = 0;
        }
        if let Some(v) = patch.departure_time {
            self.departure_time = Some(v);
            self.delay_minutes = 0;
        }
        if let Some(v) = patch.arrival_time {
            self.arrival_time = Some(v);
        }
        if let Some(v) = patch.fare {
            self.fare = v;
        }
        if let Some(v) = patch.total_seats {
            self.total_seats = v;
            self.available_seats = v;
        }
    }

    /// Add `minutes` to the running delay. Departure and arrival both move;
    /// the service date does not. `None` for an unscheduled bus.
    pub fn delay_by(&mut self, minutes: i32) -> Option<()> {
        self.departs_at()?;
        self.delay_minutes = self.delay_minutes.checked_add(minutes)?;
        Some(())
    }
}

/// Candidate bus; the route is named by its endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBus {
    pub route_from: String,
    pub route_to: String,
    pub bus_name: String,
    pub driver_name: String,
    pub bus_type: String,
    pub journey_date: Option<NaiveDate>,
    pub departure_time: Option<NaiveTime>,
    pub arrival_time: Option<NaiveTime>,
    pub total_seats: i32,
    pub fare: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusPatch {
    pub route_from: Option<String>,
    pub route_to: Option<String>,
    pub bus_name: Option<String>,
    pub driver_name: Option<String>,
    pub bus_type: Option<String>,
    pub journey_date: Option<NaiveDate>,
    pub departure_time: Option<NaiveTime>,
    pub arrival_time: Option<NaiveTime>,
    pub total_seats: Option<i32>,
    pub fare: Option<i32>,
}

impl BusPatch {
    pub fn moves_route(&self) -> bool {
        self.route_from.is_some() || self.route_to.is_some()
    }
}

// ============================================================================
// Reservations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Successful,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Successful => "SUCCESSFUL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SUCCESSFUL" => Some(ReservationStatus::Successful),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub passenger_id: i64,
    pub bus_id: i64,
    pub departure_location: String,
    pub destination: String,
    pub journey_date: NaiveDate,
    pub booked_seat: i32,
    pub fare: i64,
    pub status: ReservationStatus,
    pub booked_at: DateTime<Utc>,
}

/// Everything the store needs to debit seats and write a reservation row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationDraft {
    pub passenger_id: i64,
    pub bus_id: i64,
    pub departure_location: String,
    pub destination: String,
    pub journey_date: NaiveDate,
    pub booked_seat: i32,
    pub fare: i64,
    pub status: ReservationStatus,
    pub booked_at: DateTime<Utc>,
}

impl ReservationDraft {
    pub fn into_reservation(self, id: i64) -> Reservation {
        Reservation {
            id,
            passenger_id: self.passenger_id,
            bus_id: self.bus_id,
            departure_location: self.departure_location,
            destination: self.destination,
            journey_date: self.journey_date,
            booked_seat: self.booked_seat,
            fare: self.fare,
            status: self.status,
            booked_at: self.booked_at,
        }
    }
}

/// Result of an atomic seat debit at the store.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingOutcome {
    Confirmed(Reservation),
    InsufficientSeats { available: i32 },
    BusMissing,
    ReservationMissing,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> Bus {
        Bus {
            id: 1,
            route_id: 1,
            route_from: "Kathmandu".into(),
            route_to: "Pokhara".into(),
            bus_name: "Night Rider".into(),
            driver_name: "Ram".into(),
            bus_type: "AC".into(),
            journey_date: NaiveDate::from_ymd_opt(2030, 5, 1),
            departure_time: NaiveTime::from_hms_opt(23, 0, 0),
            arrival_time: NaiveTime::from_hms_opt(6, 30, 0),
            total_seats: 40,
            available_seats: 40,
            fare: 1200,
            delay_minutes: 0,
        }
    }

    #[test]
    fn test_patch_only_touches_given_fields() {
        let mut b = bus();
        b.apply(&BusPatch {
            driver_name: Some("Hari".into()),
            total_seats: Some(30),
            ..Default::default()
        });
        assert_eq!(b.driver_name, "Hari");
        assert_eq!(b.bus_name, "Night Rider");
        assert_eq!(b.total_seats, 30);
        assert_eq!(b.available_seats, 30);
        assert_eq!(b.fare, 1200);
    }

    #[test]
    fn test_delay_past_midnight_keeps_service_date() {
        let mut b = bus();
        b.delay_by(90).unwrap();
        assert_eq!(b.journey_date, NaiveDate::from_ymd_opt(2030, 5, 1));
        assert_eq!(b.departure_time, NaiveTime::from_hms_opt(23, 0, 0));
        assert_eq!(
            b.departs_at(),
            NaiveDate::from_ymd_opt(2030, 5, 2).and_then(|d| d.and_hms_opt(0, 30, 0))
        );
        assert_eq!(b.expected_arrival(), NaiveTime::from_hms_opt(8, 0, 0));
        assert!(b.serves_date(NaiveDate::from_ymd_opt(2030, 5, 1).unwrap()));
    }

    #[test]
    fn test_delays_accumulate_until_rescheduled() {
        let mut b = bus();
        b.delay_by(15).unwrap();
        b.delay_by(20).unwrap();
        assert_eq!(b.delay_minutes, 35);
        b.apply(&BusPatch {
            departure_time: NaiveTime::from_hms_opt(22, 0, 0),
            ..Default::default()
        });
        assert_eq!(b.delay_minutes, 0);
    }

    #[test]
    fn test_delay_needs_a_schedule() {
        let mut b = bus();
        b.departure_time = None;
        assert!(b.delay_by(10).is_none());
        assert_eq!(b.delay_minutes, 0);
    }

    #[test]
    fn test_unscheduled_bus_serves_any_date() {
        let mut b = bus();
        assert!(!b.serves_date(NaiveDate::from_ymd_opt(2030, 5, 3).unwrap()));
        b.journey_date = None;
        assert!(b.serves_date(NaiveDate::from_ymd_opt(2030, 5, 3).unwrap()));
    }
}
