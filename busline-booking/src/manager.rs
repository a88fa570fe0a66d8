use std::collections::BTreeSet;
use std::sync::Arc;

use busline_core::models::{Bus, Passenger, Reservation, User};
use busline_core::repository::{BusRepository, ReservationRepository, RouteRepository, UserRepository};
use busline_core::{today, AccessToken, CoreError, CoreResult};

use crate::models::{settle, ReservationRequest};

/// Seat-booking life cycle: every mutation re-checks ownership, the route,
/// the bus and the journey date before the store debits or credits seats.
pub struct ReservationLedger {
    users: Arc<dyn UserRepository>,
    routes: Arc<dyn RouteRepository>,
    buses: Arc<dyn BusRepository>,
    reservations: Arc<dyn ReservationRepository>,
}

impl ReservationLedger {
    pub fn new(
        users: Arc<dyn UserRepository>,
        routes: Arc<dyn RouteRepository>,
        buses: Arc<dyn BusRepository>,
        reservations: Arc<dyn ReservationRepository>,
    ) -> Self {
        Self {
            users,
            routes,
            buses,
            reservations,
        }
    }

    async fn caller_user(&self, caller: &AccessToken) -> CoreResult<User> {
        self.users
            .find_user_by_email(&caller.subject)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(caller.subject.clone()))
    }

    /// The bus serving the requested route on the requested day, lowest id first.
    async fn bus_for(&self, request: &ReservationRequest) -> CoreResult<Bus> {
        let route = self
            .routes
            .find_route_by_endpoints(&request.departure_location, &request.destination)
            .await?
            .ok_or_else(|| {
                CoreError::RouteNotFound(format!("{} -> {}", request.departure_location, request.destination))
            })?;

        self.buses
            .list_buses_on_route(route.id)
            .await?
            .into_iter()
            .filter(|b| b.serves_date(request.journey_date))
            .min_by_key(|b| b.id)
            .ok_or_else(|| CoreError::BusNotFound(format!("no bus on route {}", route.id)))
    }

    /// A reservation belonging to `passenger`, or `ReservationNotFound`.
    async fn owned(&self, passenger: Option<&Passenger>, id: i64) -> CoreResult<Reservation> {
        let passenger = passenger.ok_or(CoreError::ReservationNotFound(id))?;
        match self.reservations.find_reservation(id).await? {
            Some(r) if r.passenger_id == passenger.id => Ok(r),
            _ => Err(CoreError::ReservationNotFound(id)),
        }
    }

    pub async fn add_reservation(
        &self,
        caller: &AccessToken,
        request: ReservationRequest,
    ) -> CoreResult<Reservation> {
        request.validate()?;
        let user = self.caller_user(caller).await?;

        let bus = self.bus_for(&request).await?;
        if bus.available_seats < request.booked_seat {
            return Err(CoreError::InsufficientSeats {
                requested: request.booked_seat,
                available: bus.available_seats,
            });
        }

        if request.journey_date < today() {
            return Err(CoreError::InvalidJourneyDate(request.journey_date));
        }

        let passenger = self
            .users
            .find_passenger_by_user(user.id)
            .await?
            .ok_or(CoreError::PassengerDetailsMissing)?;

        let outcome = self.reservations.book(request.draft(&passenger, &bus)).await?;
        let reservation = settle(outcome, &request, bus.id, None)?;
        tracing::info!(
            reservation_id = reservation.id,
            bus_id = bus.id,
            seats = reservation.booked_seat,
            "reservation confirmed"
        );
        Ok(reservation)
    }

    /// Cancel the old booking and book the new request in one store call.
    pub async fn update_reservation(
        &self,
        caller: &AccessToken,
        id: i64,
        request: ReservationRequest,
    ) -> CoreResult<Reservation> {
        request.validate()?;
        let user = self.caller_user(caller).await?;
        let passenger = self.users.find_passenger_by_user(user.id).await?;
        let existing = self.owned(passenger.as_ref(), id).await?;

        if existing.journey_date < today() {
            return Err(CoreError::PastJourney(existing.journey_date));
        }

        let bus = self.bus_for(&request).await?;
        let returned = if existing.bus_id == bus.id {
            existing.booked_seat
        } else {
            0
        };
        let available = (bus.available_seats + returned).min(bus.total_seats);
        if available < request.booked_seat {
            return Err(CoreError::InsufficientSeats {
                requested: request.booked_seat,
                available,
            });
        }

        if request.journey_date < today() {
            return Err(CoreError::InvalidJourneyDate(request.journey_date));
        }

        let passenger = passenger.ok_or(CoreError::ReservationNotFound(id))?;
        let outcome = self
            .reservations
            .rebook(id, request.draft(&passenger, &bus))
            .await?;
        let reservation = settle(outcome, &request, bus.id, Some(id))?;
        tracing::info!(reservation_id = id, bus_id = bus.id, "reservation changed");
        Ok(reservation)
    }

    pub async fn delete_reservation(&self, caller: &AccessToken, id: i64) -> CoreResult<Reservation> {
        let user = self.caller_user(caller).await?;
        let passenger = self.users.find_passenger_by_user(user.id).await?;
        let existing = self.owned(passenger.as_ref(), id).await?;

        if existing.journey_date < today() {
            return Err(CoreError::PastJourney(existing.journey_date));
        }

        let cancelled = self
            .reservations
            .cancel(id)
            .await?
            .ok_or(CoreError::ReservationNotFound(id))?;
        tracing::info!(reservation_id = id, seats = cancelled.booked_seat, "reservation cancelled");
        Ok(cancelled)
    }

    pub async fn view_reservation(&self, caller: &AccessToken, id: i64) -> CoreResult<Reservation> {
        let reservation = self
            .reservations
            .find_reservation(id)
            .await?
            .ok_or(CoreError::ReservationNotFound(id))?;
        match self.users.find_passenger(reservation.passenger_id).await? {
            Some(owner) => caller.authorize_id(owner.user_id)?,
            None => caller.require_admin()?,
        }
        Ok(reservation)
    }

    pub async fn all_reservations(&self, caller: &AccessToken) -> CoreResult<Vec<Reservation>> {
        caller.require_admin()?;
        let all = self.reservations.list_reservations().await?;
        if all.is_empty() {
            return Err(CoreError::NotFound("No reservations found".into()));
        }
        Ok(all)
    }

    pub async fn reservations_for_caller(&self, caller: &AccessToken) -> CoreResult<Vec<Reservation>> {
        let user = self.caller_user(caller).await?;
        let passenger = self
            .users
            .find_passenger_by_user(user.id)
            .await?
            .ok_or(CoreError::NoReservationsForUser)?;
        let mine = self.reservations.reservations_for_passenger(passenger.id).await?;
        if mine.is_empty() {
            return Err(CoreError::NoReservationsForUser);
        }
        Ok(mine)
    }

    pub async fn reservations_for_user(&self, caller: &AccessToken, user_id: i64) -> CoreResult<Vec<Reservation>> {
        caller.authorize_id(user_id)?;
        if self.users.find_user(user_id).await?.is_none() {
            return Err(CoreError::UserNotFound(user_id.to_string()));
        }
        let passenger = self
            .users
            .find_passenger_by_user(user_id)
            .await?
            .ok_or(CoreError::PassengerNotFound(user_id))?;
        let theirs = self.reservations.reservations_for_passenger(passenger.id).await?;
        if theirs.is_empty() {
            return Err(CoreError::NoReservationsForUser);
        }
        Ok(theirs)
    }

    /// Reservations whose journey is today.
    pub async fn count_active_today(&self) -> CoreResult<i64> {
        match self.reservations.count_reservations_on(today()).await? {
            0 => Err(CoreError::NoActiveReservations),
            n => Ok(n),
        }
    }

    pub async fn reservations_for_bus(&self, bus_id: i64) -> CoreResult<Vec<Reservation>> {
        Ok(self.reservations.reservations_for_bus(bus_id).await?)
    }

    /// Users holding at least one reservation on `bus_id`.
    pub async fn passengers_on_bus(&self, bus_id: i64) -> CoreResult<BTreeSet<i64>> {
        let mut users = BTreeSet::new();
        for reservation in self.reservations_for_bus(bus_id).await? {
            match self.users.find_passenger(reservation.passenger_id).await? {
                Some(passenger) => {
                    users.insert(passenger.user_id);
                }
                None => {
                    tracing::debug!(reservation_id = reservation.id, "reservation without passenger");
                }
            }
        }
        Ok(users)
    }
}
