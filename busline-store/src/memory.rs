//! In-process store: every table lives behind one `RwLock`, so each port
//! call sees and leaves a consistent arena.

use std::collections::BTreeMap;

use async_trait::async_trait;
use busline_core::models::{
    Admin, BookingOutcome, Bus, NewAdmin, NewBus, NewRoute, NewUser, Passenger, PassengerDetails,
    Reservation, ReservationDraft, Route, User,
};
use busline_core::repository::{
    AdminRepository, BusRepository, DuplicateKey, RepoResult, ReservationRepository,
    RouteRepository, UserRepository,
};
use busline_shared::Masked;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

#[derive(Default)]
struct Sequences {
    user: i64,
    passenger: i64,
    admin: i64,
    route: i64,
    bus: i64,
    reservation: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Default)]
struct Tables {
    seq: Sequences,
    users: BTreeMap<i64, User>,
    passengers: BTreeMap<i64, Passenger>,
    admins: BTreeMap<i64, Admin>,
    routes: BTreeMap<i64, Route>,
    buses: BTreeMap<i64, Bus>,
    reservations: BTreeMap<i64, Reservation>,
}

impl Tables {
    fn credit(&mut self, bus_id: i64, seats: i32) {
        if let Some(bus) = self.buses.get_mut(&bus_id) {
            bus.available_seats = (bus.available_seats + seats).min(bus.total_seats);
        }
    }

    fn passenger_of(&self, user_id: i64) -> Option<&Passenger> {
        self.passengers.values().find(|p| p.user_id == user_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_user(&self, id: i64) -> RepoResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(
        &self,
        user: NewUser,
        passenger: Option<PassengerDetails>,
    ) -> RepoResult<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(DuplicateKey::boxed(format!("users.email {}", user.email)));
        }
        let id = next(&mut t.seq.user);
        let stored = User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            user_name: user.user_name,
            first_name: user.first_name,
            last_name: user.last_name,
            phone_number: user.phone_number,
            roles: user.roles,
            created_at: Utc::now(),
        };
        t.users.insert(id, stored.clone());
        if let Some(details) = passenger {
            let pid = next(&mut t.seq.passenger);
            t.passengers.insert(
                pid,
                Passenger {
                    id: pid,
                    user_id: id,
                    first_name: details.first_name,
                    last_name: details.last_name,
                    phone_number: details.phone_number,
                },
            );
        }
        Ok(stored)
    }

    async fn update_password(&self, user_id: i64, password_hash: &str) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        match t.users.get_mut(&user_id) {
            Some(user) => {
                user.password_hash = Masked(password_hash.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: i64) -> RepoResult<Option<Vec<Reservation>>> {
        let mut t = self.tables.write().await;
        if t.users.remove(&id).is_none() {
            return Ok(None);
        }
        let mut cancelled = Vec::new();
        if let Some(pid) = t.passenger_of(id).map(|p| p.id) {
            let ids: Vec<i64> = t
                .reservations
                .values()
                .filter(|r| r.passenger_id == pid)
                .map(|r| r.id)
                .collect();
            for rid in ids {
                if let Some(r) = t.reservations.remove(&rid) {
                    t.credit(r.bus_id, r.booked_seat);
                    cancelled.push(r);
                }
            }
            t.passengers.remove(&pid);
        }
        Ok(Some(cancelled))
    }

    async fn find_passenger(&self, id: i64) -> RepoResult<Option<Passenger>> {
        Ok(self.tables.read().await.passengers.get(&id).cloned())
    }

    async fn find_passenger_by_user(&self, user_id: i64) -> RepoResult<Option<Passenger>> {
        Ok(self.tables.read().await.passenger_of(user_id).cloned())
    }

    async fn upsert_passenger(
        &self,
        user_id: i64,
        details: PassengerDetails,
    ) -> RepoResult<Passenger> {
        let mut t = self.tables.write().await;
        let existing = t.passenger_of(user_id).map(|p| p.id);
        let id = match existing {
            Some(id) => id,
            None => next(&mut t.seq.passenger),
        };
        let passenger = Passenger {
            id,
            user_id,
            first_name: details.first_name,
            last_name: details.last_name,
            phone_number: details.phone_number,
        };
        t.passengers.insert(id, passenger.clone());
        Ok(passenger)
    }

    async fn list_passengers(&self) -> RepoResult<Vec<Passenger>> {
        Ok(self.tables.read().await.passengers.values().cloned().collect())
    }

    async fn count_passengers(&self) -> RepoResult<i64> {
        Ok(self.tables.read().await.passengers.len() as i64)
    }
}

#[async_trait]
impl AdminRepository for MemoryStore {
    async fn find_admin(&self, id: i64) -> RepoResult<Option<Admin>> {
        Ok(self.tables.read().await.admins.get(&id).cloned())
    }

    async fn find_admin_by_email(&self, email: &str) -> RepoResult<Option<Admin>> {
        let t = self.tables.read().await;
        Ok(t.admins.values().find(|a| a.email == email).cloned())
    }

    async fn insert_admin(&self, admin: NewAdmin) -> RepoResult<Admin> {
        let mut t = self.tables.write().await;
        if t.admins.values().any(|a| a.email == admin.email) {
            return Err(DuplicateKey::boxed(format!("admins.email {}", admin.email)));
        }
        let id = next(&mut t.seq.admin);
        let stored = Admin {
            id,
            user_name: admin.user_name,
            email: admin.email,
            password_hash: admin.password_hash,
        };
        t.admins.insert(id, stored.clone());
        Ok(stored)
    }

    async fn save_admin(&self, admin: &Admin) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        if t.admins.values().any(|a| a.id != admin.id && a.email == admin.email) {
            return Err(DuplicateKey::boxed(format!("admins.email {}", admin.email)));
        }
        match t.admins.get_mut(&admin.id) {
            Some(slot) => {
                *slot = admin.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RouteRepository for MemoryStore {
    async fn find_route(&self, id: i64) -> RepoResult<Option<Route>> {
        Ok(self.tables.read().await.routes.get(&id).cloned())
    }

    async fn find_route_by_endpoints(&self, from: &str, to: &str) -> RepoResult<Option<Route>> {
        let t = self.tables.read().await;
        Ok(t.routes.values().find(|r| r.connects(from, to)).cloned())
    }

    async fn list_routes(&self) -> RepoResult<Vec<Route>> {
        Ok(self.tables.read().await.routes.values().cloned().collect())
    }

    async fn insert_route(&self, route: NewRoute) -> RepoResult<Route> {
        let mut t = self.tables.write().await;
        if t.routes.values().any(|r| r.connects(&route.route_from, &route.route_to)) {
            return Err(DuplicateKey::boxed(format!(
                "routes {} -> {}",
                route.route_from, route.route_to
            )));
        }
        let id = next(&mut t.seq.route);
        let stored = Route {
            id,
            route_from: route.route_from,
            route_to: route.route_to,
            distance: route.distance,
        };
        t.routes.insert(id, stored.clone());
        Ok(stored)
    }

    async fn save_route(&self, route: &Route) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        if t.buses.values().any(|b| b.route_id == route.id) {
            return Ok(false);
        }
        if t
            .routes
            .values()
            .any(|r| r.id != route.id && r.connects(&route.route_from, &route.route_to))
        {
            return Err(DuplicateKey::boxed(format!(
                "routes {} -> {}",
                route.route_from, route.route_to
            )));
        }
        match t.routes.get_mut(&route.id) {
            Some(slot) => {
                *slot = route.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_route(&self, id: i64) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        if t.buses.values().any(|b| b.route_id == id) {
            return Ok(false);
        }
        Ok(t.routes.remove(&id).is_some())
    }

    async fn count_routes(&self) -> RepoResult<i64> {
        Ok(self.tables.read().await.routes.len() as i64)
    }
}

#[async_trait]
impl BusRepository for MemoryStore {
    async fn find_bus(&self, id: i64) -> RepoResult<Option<Bus>> {
        Ok(self.tables.read().await.buses.get(&id).cloned())
    }

    async fn list_buses(&self) -> RepoResult<Vec<Bus>> {
        Ok(self.tables.read().await.buses.values().cloned().collect())
    }

    async fn list_buses_by_type(&self, bus_type: &str) -> RepoResult<Vec<Bus>> {
        let t = self.tables.read().await;
        Ok(t.buses.values().filter(|b| b.bus_type == bus_type).cloned().collect())
    }

    async fn list_buses_on_route(&self, route_id: i64) -> RepoResult<Vec<Bus>> {
        let t = self.tables.read().await;
        Ok(t.buses.values().filter(|b| b.route_id == route_id).cloned().collect())
    }

    async fn insert_bus(&self, route: &Route, bus: NewBus) -> RepoResult<Bus> {
        let mut t = self.tables.write().await;
        let id = next(&mut t.seq.bus);
        let stored = Bus {
            id,
            route_id: route.id,
            route_from: route.route_from.clone(),
            route_to: route.route_to.clone(),
            bus_name: bus.bus_name,
            driver_name: bus.driver_name,
            bus_type: bus.bus_type,
            journey_date: bus.journey_date,
            departure_time: bus.departure_time,
            arrival_time: bus.arrival_time,
            total_seats: bus.total_seats,
            available_seats: bus.total_seats,
            fare: bus.fare,
            delay_minutes: 0,
        };
        t.buses.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_bus_if_unbooked(&self, bus: &Bus) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        match t.buses.get_mut(&bus.id) {
            Some(slot) if slot.is_unbooked() => {
                *slot = bus.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_bus_if_unbooked(&self, id: i64) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        if t.buses.get(&id).is_some_and(Bus::is_unbooked) {
            t.buses.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn reschedule_bus(&self, bus: &Bus) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        match t.buses.get_mut(&bus.id) {
            Some(slot) => {
                slot.journey_date = bus.journey_date;
                slot.departure_time = bus.departure_time;
                slot.arrival_time = bus.arrival_time;
                slot.delay_minutes = bus.delay_minutes;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_buses(&self) -> RepoResult<i64> {
        Ok(self.tables.read().await.buses.len() as i64)
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn find_reservation(&self, id: i64) -> RepoResult<Option<Reservation>> {
        Ok(self.tables.read().await.reservations.get(&id).cloned())
    }

    async fn list_reservations(&self) -> RepoResult<Vec<Reservation>> {
        Ok(self.tables.read().await.reservations.values().cloned().collect())
    }

    async fn reservations_for_passenger(&self, passenger_id: i64) -> RepoResult<Vec<Reservation>> {
        let t = self.tables.read().await;
        Ok(t.reservations
            .values()
            .filter(|r| r.passenger_id == passenger_id)
            .cloned()
            .collect())
    }

    async fn reservations_for_bus(&self, bus_id: i64) -> RepoResult<Vec<Reservation>> {
        let t = self.tables.read().await;
        Ok(t.reservations
            .values()
            .filter(|r| r.bus_id == bus_id)
            .cloned()
            .collect())
    }

    async fn count_reservations_on(&self, date: NaiveDate) -> RepoResult<i64> {
        let t = self.tables.read().await;
        Ok(t.reservations.values().filter(|r| r.journey_date == date).count() as i64)
    }

    async fn book(&self, draft: ReservationDraft) -> RepoResult<BookingOutcome> {
        let mut t = self.tables.write().await;
        let Some(bus) = t.buses.get_mut(&draft.bus_id) else {
            return Ok(BookingOutcome::BusMissing);
        };
        if bus.available_seats < draft.booked_seat {
            return Ok(BookingOutcome::InsufficientSeats {
                available: bus.available_seats,
            });
        }
        bus.available_seats -= draft.booked_seat;
        let id = next(&mut t.seq.reservation);
        let reservation = draft.into_reservation(id);
        t.reservations.insert(id, reservation.clone());
        Ok(BookingOutcome::Confirmed(reservation))
    }

    async fn cancel(&self, id: i64) -> RepoResult<Option<Reservation>> {
        let mut t = self.tables.write().await;
        let Some(reservation) = t.reservations.remove(&id) else {
            return Ok(None);
        };
        t.credit(reservation.bus_id, reservation.booked_seat);
        Ok(Some(reservation))
    }

    async fn rebook(&self, id: i64, draft: ReservationDraft) -> RepoResult<BookingOutcome> {
        let mut t = self.tables.write().await;
        let Some(old) = t.reservations.get(&id).cloned() else {
            return Ok(BookingOutcome::ReservationMissing);
        };
        let Some(target) = t.buses.get(&draft.bus_id) else {
            return Ok(BookingOutcome::BusMissing);
        };

        // Seats on the target once the old booking is handed back.
        let available = if old.bus_id == target.id {
            (target.available_seats + old.booked_seat).min(target.total_seats)
        } else {
            target.available_seats
        };
        if available < draft.booked_seat {
            return Ok(BookingOutcome::InsufficientSeats { available });
        }

        t.credit(old.bus_id, old.booked_seat);
        if let Some(bus) = t.buses.get_mut(&draft.bus_id) {
            bus.available_seats -= draft.booked_seat;
        }
        let reservation = draft.into_reservation(id);
        t.reservations.insert(id, reservation.clone());
        Ok(BookingOutcome::Confirmed(reservation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_core::models::ReservationStatus;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    async fn seeded(seats: i32) -> (MemoryStore, Bus) {
        let store = MemoryStore::new();
        let route = store
            .insert_route(NewRoute {
                route_from: "A".into(),
                route_to: "B".into(),
                distance: 100,
            })
            .await
            .unwrap();
        let bus = store
            .insert_bus(
                &route,
                NewBus {
                    route_from: "A".into(),
                    route_to: "B".into(),
                    bus_name: "Express".into(),
                    driver_name: "Ram".into(),
                    bus_type: "AC".into(),
                    journey_date: None,
                    departure_time: None,
                    arrival_time: None,
                    total_seats: seats,
                    fare: 20,
                },
            )
            .await
            .unwrap();
        (store, bus)
    }

    fn draft(bus_id: i64, seats: i32) -> ReservationDraft {
        ReservationDraft {
            passenger_id: 1,
            bus_id,
            departure_location: "A".into(),
            destination: "B".into(),
            journey_date: NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
            booked_seat: seats,
            fare: 20 * seats as i64,
            status: ReservationStatus::Successful,
            booked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_book_debits_and_cancel_credits() {
        let (store, bus) = seeded(50).await;
        let BookingOutcome::Confirmed(r) = store.book(draft(bus.id, 3)).await.unwrap() else {
            panic!("booking should succeed");
        };
        assert_eq!(store.find_bus(bus.id).await.unwrap().unwrap().available_seats, 47);

        store.cancel(r.id).await.unwrap().unwrap();
        assert_eq!(store.find_bus(bus.id).await.unwrap().unwrap().available_seats, 50);
        assert!(store.find_reservation(r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_short_bus_leaves_state_untouched() {
        let (store, bus) = seeded(2).await;
        let outcome = store.book(draft(bus.id, 3)).await.unwrap();
        assert_eq!(outcome, BookingOutcome::InsufficientSeats { available: 2 });
        assert_eq!(store.find_bus(bus.id).await.unwrap().unwrap().available_seats, 2);
        assert!(store.list_reservations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebook_on_same_bus_counts_returned_seats() {
        let (store, bus) = seeded(5).await;
        let BookingOutcome::Confirmed(r) = store.book(draft(bus.id, 4)).await.unwrap() else {
            panic!("booking should succeed");
        };
        // 1 free + 4 handed back
        let outcome = store.rebook(r.id, draft(bus.id, 5)).await.unwrap();
        assert!(matches!(outcome, BookingOutcome::Confirmed(ref n) if n.id == r.id && n.booked_seat == 5));
        assert_eq!(store.find_bus(bus.id).await.unwrap().unwrap().available_seats, 0);
    }

    #[tokio::test]
    async fn test_failed_rebook_keeps_old_booking() {
        let (store, bus) = seeded(5).await;
        let BookingOutcome::Confirmed(r) = store.book(draft(bus.id, 2)).await.unwrap() else {
            panic!("booking should succeed");
        };
        let outcome = store.rebook(r.id, draft(bus.id, 6)).await.unwrap();
        assert_eq!(outcome, BookingOutcome::InsufficientSeats { available: 5 });
        assert_eq!(store.find_bus(bus.id).await.unwrap().unwrap().available_seats, 3);
        assert_eq!(store.find_reservation(r.id).await.unwrap().unwrap().booked_seat, 2);
    }

    #[tokio::test]
    async fn test_guarded_bus_writes_refuse_booked_bus() {
        let (store, bus) = seeded(5).await;
        store.book(draft(bus.id, 1)).await.unwrap();
        let mut edited = bus.clone();
        edited.fare = 99;
        assert!(!store.update_bus_if_unbooked(&edited).await.unwrap());
        assert!(!store.delete_bus_if_unbooked(bus.id).await.unwrap());
        assert!(!store.delete_route(bus.route_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_route_with_buses_cannot_be_saved() {
        let (store, bus) = seeded(5).await;
        let mut route = store.find_route(bus.route_id).await.unwrap().unwrap();
        route.distance = 250;
        assert!(!store.save_route(&route).await.unwrap());
        assert_eq!(store.find_route(route.id).await.unwrap().unwrap().distance, 100);
    }

    #[tokio::test]
    async fn test_unique_keys_surface_as_duplicate_key() {
        let (store, _) = seeded(5).await;
        let err = store
            .insert_route(NewRoute {
                route_from: "A".into(),
                route_to: "B".into(),
                distance: 10,
            })
            .await
            .unwrap_err();
        assert!(busline_core::repository::is_duplicate(&err));

        let first = store
            .insert_admin(NewAdmin {
                user_name: "ops".into(),
                email: "ops@example.com".into(),
                password_hash: Masked("hash".into()),
            })
            .await
            .unwrap();
        let mut second = store
            .insert_admin(NewAdmin {
                user_name: "desk".into(),
                email: "desk@example.com".into(),
                password_hash: Masked("hash".into()),
            })
            .await
            .unwrap();
        second.email = first.email.clone();
        let err = store.save_admin(&second).await.unwrap_err();
        assert!(busline_core::repository::is_duplicate(&err));
    }

    #[tokio::test]
    async fn test_concurrent_bookings_never_oversell() {
        let (store, bus) = seeded(10).await;
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..25 {
            let store = store.clone();
            let bus_id = bus.id;
            handles.push(tokio::spawn(async move { store.book(draft(bus_id, 1)).await.unwrap() }));
        }
        let mut confirmed = 0;
        for h in handles {
            if let BookingOutcome::Confirmed(_) = h.await.unwrap() {
                confirmed += 1;
            }
        }
        assert_eq!(confirmed, 10);
        assert_eq!(store.find_bus(bus.id).await.unwrap().unwrap().available_seats, 0);
    }

    #[tokio::test]
    async fn test_deleting_user_returns_seats() {
        let (store, bus) = seeded(10).await;
        let user = store
            .insert_user(
                NewUser {
                    email: "sita@example.com".into(),
                    password_hash: Masked("hash".into()),
                    user_name: None,
                    first_name: Some("Sita".into()),
                    last_name: Some("Rai".into()),
                    phone_number: None,
                    roles: BTreeSet::new(),
                },
                Some(PassengerDetails {
                    first_name: "Sita".into(),
                    last_name: "Rai".into(),
                    phone_number: None,
                }),
            )
            .await
            .unwrap();
        let passenger = store.find_passenger_by_user(user.id).await.unwrap().unwrap();
        let mut d = draft(bus.id, 4);
        d.passenger_id = passenger.id;
        store.book(d).await.unwrap();

        let cancelled = store.delete_user(user.id).await.unwrap().unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(store.find_bus(bus.id).await.unwrap().unwrap().available_seats, 10);
        assert!(store.find_passenger(passenger.id).await.unwrap().is_none());
        assert!(store.delete_user(user.id).await.unwrap().is_none());
    }
}
