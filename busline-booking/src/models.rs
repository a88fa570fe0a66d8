use busline_core::models::{BookingOutcome, Bus, Passenger, Reservation, ReservationDraft, ReservationStatus};
use busline_core::{CoreError, CoreResult};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// What a passenger asks for when booking or changing a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub departure_location: String,
    pub destination: String,
    pub journey_date: NaiveDate,
    pub booked_seat: i32,
}

impl ReservationRequest {
    pub(crate) fn validate(&self) -> CoreResult<()> {
        if self.booked_seat < 1 {
            return Err(CoreError::Validation("at least one seat must be booked".into()));
        }
        Ok(())
    }

    pub(crate) fn draft(&self, passenger: &Passenger, bus: &Bus) -> ReservationDraft {
        ReservationDraft {
            passenger_id: passenger.id,
            bus_id: bus.id,
            departure_location: self.departure_location.clone(),
            destination: self.destination.clone(),
            journey_date: self.journey_date,
            booked_seat: self.booked_seat,
            fare: bus.fare as i64 * self.booked_seat as i64,
            status: ReservationStatus::Successful,
            booked_at: Utc::now(),
        }
    }
}

/// Turn a store-level booking outcome into the ledger's result.
pub(crate) fn settle(outcome: BookingOutcome, request: &ReservationRequest, bus_id: i64, reservation_id: Option<i64>) -> CoreResult<Reservation> {
    match outcome {
        BookingOutcome::Confirmed(reservation) => Ok(reservation),
        BookingOutcome::InsufficientSeats { available } => Err(CoreError::InsufficientSeats {
            requested: request.booked_seat,
            available,
        }),
        BookingOutcome::BusMissing => Err(CoreError::BusNotFound(bus_id.to_string())),
        BookingOutcome::ReservationMissing => {
            Err(CoreError::ReservationNotFound(reservation_id.unwrap_or_default()))
        }
    }
}
