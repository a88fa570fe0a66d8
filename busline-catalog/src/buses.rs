use std::sync::Arc;

use busline_core::models::{Bus, BusPatch, NewBus};
use busline_core::repository::{BusRepository, RouteRepository};
use busline_core::{CoreError, CoreResult};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

/// Query for [`BusService::search_buses`]; endpoints match as
/// case-insensitive substrings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusSearch {
    pub route_from: Option<String>,
    pub route_to: Option<String>,
    pub journey_date: Option<NaiveDate>,
}

fn matches_place(wanted: &Option<String>, actual: &str) -> bool {
    match wanted {
        Some(w) => actual.to_lowercase().contains(&w.trim().to_lowercase()),
        None => true,
    }
}

fn validate_bus(total_seats: i32, fare: i32) -> CoreResult<()> {
    if total_seats <= 0 {
        return Err(CoreError::Validation("total seats must be positive".into()));
    }
    if fare < 0 {
        return Err(CoreError::Validation("fare must not be negative".into()));
    }
    Ok(())
}

pub struct BusService {
    routes: Arc<dyn RouteRepository>,
    buses: Arc<dyn BusRepository>,
}

impl BusService {
    pub fn new(routes: Arc<dyn RouteRepository>, buses: Arc<dyn BusRepository>) -> Self {
        Self { routes, buses }
    }

    pub async fn add_bus(&self, bus: NewBus) -> CoreResult<Bus> {
        validate_bus(bus.total_seats, bus.fare)?;
        let route = self
            .routes
            .find_route_by_endpoints(&bus.route_from, &bus.route_to)
            .await?
            .ok_or_else(|| CoreError::RouteNotFound(format!("{} -> {}", bus.route_from, bus.route_to)))?;

        let attached = self.buses.list_buses_on_route(route.id).await?;
        if attached.iter().any(|b| b.same_service(&bus)) {
            return Err(CoreError::DuplicateBusOnRoute);
        }

        let bus = self.buses.insert_bus(&route, bus).await?;
        tracing::info!(bus_id = bus.id, route_id = route.id, "added bus");
        Ok(bus)
    }

    pub async fn view_bus(&self, id: i64) -> CoreResult<Bus> {
        self.buses
            .find_bus(id)
            .await?
            .ok_or_else(|| CoreError::BusNotFound(id.to_string()))
    }

    pub async fn update_bus(&self, id: i64, patch: BusPatch) -> CoreResult<Bus> {
        let mut bus = self.view_bus(id).await?;
        if !bus.is_unbooked() {
            return Err(CoreError::SeatsAlreadyScheduled(id));
        }

        if patch.moves_route() {
            let from = patch.route_from.clone().unwrap_or_else(|| bus.route_from.clone());
            let to = patch.route_to.clone().unwrap_or_else(|| bus.route_to.clone());
            let route = self
                .routes
                .find_route_by_endpoints(&from, &to)
                .await?
                .ok_or_else(|| CoreError::RouteNotFound(format!("{} -> {}", from, to)))?;
            bus.route_id = route.id;
            bus.route_from = route.route_from;
            bus.route_to = route.route_to;
        }

        bus.apply(&patch);
        validate_bus(bus.total_seats, bus.fare)?;

        if !self.buses.update_bus_if_unbooked(&bus).await? {
            return Err(CoreError::SeatsAlreadyScheduled(id));
        }
        tracing::info!(bus_id = id, "updated bus");
        Ok(bus)
    }

    pub async fn delete_bus(&self, id: i64) -> CoreResult<Bus> {
        let bus = self.view_bus(id).await?;
        if !bus.is_unbooked() || !self.buses.delete_bus_if_unbooked(id).await? {
            return Err(CoreError::SeatsAlreadyScheduled(id));
        }
        tracing::info!(bus_id = id, "deleted bus");
        Ok(bus)
    }

    pub async fn list_buses_by_type(&self, bus_type: &str) -> CoreResult<Vec<Bus>> {
        let buses = self.buses.list_buses_by_type(bus_type).await?;
        if buses.is_empty() {
            return Err(CoreError::NotFound(format!("No buses found of type {}", bus_type)));
        }
        Ok(buses)
    }

    pub async fn list_all_buses(&self) -> CoreResult<Vec<Bus>> {
        let buses = self.buses.list_buses().await?;
        if buses.is_empty() {
            return Err(CoreError::NotFound("No buses found".into()));
        }
        Ok(buses)
    }

    pub async fn count_buses(&self) -> CoreResult<i64> {
        match self.buses.count_buses().await? {
            0 => Err(CoreError::NotFound("No buses found".into())),
            n => Ok(n),
        }
    }

    pub async fn search_buses(&self, query: &BusSearch) -> CoreResult<Vec<Bus>> {
        self.search_buses_at(query, Utc::now().naive_utc()).await
    }

    /// Search relative to `now`; unscheduled buses count as still ahead.
    pub async fn search_buses_at(&self, query: &BusSearch, now: NaiveDateTime) -> CoreResult<Vec<Bus>> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        if blank(&query.route_from) && blank(&query.route_to) {
            return Err(CoreError::Validation("give a departure or a destination to search".into()));
        }

        let found: Vec<Bus> = self
            .buses
            .list_buses()
            .await?
            .into_iter()
            .filter(|b| matches_place(&query.route_from, &b.route_from))
            .filter(|b| matches_place(&query.route_to, &b.route_to))
            .filter(|b| query.journey_date.map_or(true, |d| b.journey_date == Some(d)))
            .filter(|b| b.departs_at().map_or(true, |t| t > now))
            .collect();

        if found.is_empty() {
            return Err(CoreError::NotFound("No buses match the search".into()));
        }
        Ok(found)
    }

    pub async fn delay_departure(&self, bus_id: i64, minutes: i64) -> CoreResult<Bus> {
        self.delay_departure_at(bus_id, minutes, Utc::now().naive_utc()).await
    }

    pub async fn delay_departure_at(&self, bus_id: i64, minutes: i64, now: NaiveDateTime) -> CoreResult<Bus> {
        if minutes <= 0 {
            return Err(CoreError::Validation("delay must be a positive number of minutes".into()));
        }
        let mut bus = self.view_bus(bus_id).await?;
        let departs = bus
            .departs_at()
            .ok_or_else(|| CoreError::Validation(format!("bus {} has no departure scheduled", bus_id)))?;
        if departs <= now {
            return Err(CoreError::Validation(format!("bus {} has already departed", bus_id)));
        }

        i32::try_from(minutes)
            .ok()
            .and_then(|minutes| bus.delay_by(minutes))
            .ok_or_else(|| CoreError::Validation(format!("delay of {} minutes is out of range", minutes)))?;
        if !self.buses.reschedule_bus(&bus).await? {
            return Err(CoreError::BusNotFound(bus_id.to_string()));
        }
        tracing::info!(bus_id, minutes, "delayed departure");
        Ok(bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_core::models::{NewRoute, ReservationDraft, ReservationStatus};
    use busline_core::repository::ReservationRepository;
    use busline_store::MemoryStore;
    use chrono::NaiveTime;

    async fn setup() -> (BusService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for (from, to) in [("Kathmandu", "Pokhara"), ("Kathmandu", "Chitwan")] {
            store
                .insert_route(NewRoute {
                    route_from: from.into(),
                    route_to: to.into(),
                    distance: 200,
                })
                .await
                .unwrap();
        }
        (BusService::new(store.clone(), store.clone()), store)
    }

    fn new_bus(to: &str, date: Option<NaiveDate>) -> NewBus {
        NewBus {
            route_from: "Kathmandu".into(),
            route_to: to.into(),
            bus_name: "Express".into(),
            driver_name: "Ram".into(),
            bus_type: "AC".into(),
            journey_date: date,
            departure_time: NaiveTime::from_hms_opt(7, 0, 0),
            arrival_time: NaiveTime::from_hms_opt(14, 0, 0),
            total_seats: 50,
            fare: 20,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, d).unwrap()
    }

    async fn book_one(store: &MemoryStore, bus_id: i64) {
        store
            .book(ReservationDraft {
                passenger_id: 1,
                bus_id,
                departure_location: "Kathmandu".into(),
                destination: "Pokhara".into(),
                journey_date: day(10),
                booked_seat: 3,
                fare: 60,
                status: ReservationStatus::Successful,
                booked_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_new_bus_starts_with_every_seat_free() {
        let (svc, _) = setup().await;
        let bus = svc.add_bus(new_bus("Pokhara", Some(day(10)))).await.unwrap();
        assert_eq!(bus.available_seats, 50);
        assert_eq!(bus.route_to, "Pokhara");
    }

    #[tokio::test]
    async fn test_unknown_route_and_duplicate_bus() {
        let (svc, _) = setup().await;
        assert!(matches!(
            svc.add_bus(new_bus("Lumbini", None)).await,
            Err(CoreError::RouteNotFound(_))
        ));
        svc.add_bus(new_bus("Pokhara", Some(day(10)))).await.unwrap();
        assert!(matches!(
            svc.add_bus(new_bus("Pokhara", Some(day(10)))).await,
            Err(CoreError::DuplicateBusOnRoute)
        ));
        // same bus on another day is a different service
        svc.add_bus(new_bus("Pokhara", Some(day(11)))).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_refused_once_seats_are_booked() {
        let (svc, store) = setup().await;
        let booked = svc.add_bus(new_bus("Pokhara", Some(day(10)))).await.unwrap();
        let free = svc.add_bus(new_bus("Chitwan", Some(day(10)))).await.unwrap();
        book_one(&store, booked.id).await;

        assert!(matches!(
            svc.delete_bus(booked.id).await,
            Err(CoreError::SeatsAlreadyScheduled(_))
        ));
        assert_eq!(svc.view_bus(booked.id).await.unwrap().available_seats, 47);
        assert_eq!(svc.delete_bus(free.id).await.unwrap().id, free.id);
        assert!(matches!(svc.view_bus(free.id).await, Err(CoreError::BusNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_patches_and_moves_route() {
        let (svc, _) = setup().await;
        let bus = svc.add_bus(new_bus("Pokhara", Some(day(10)))).await.unwrap();
        let updated = svc
            .update_bus(
                bus.id,
                BusPatch {
                    route_to: Some("Chitwan".into()),
                    total_seats: Some(30),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.route_to, "Chitwan");
        assert_eq!(updated.bus_name, "Express");
        assert_eq!((updated.total_seats, updated.available_seats), (30, 30));

        let err = svc
            .update_bus(
                bus.id,
                BusPatch {
                    route_to: Some("Lumbini".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::RouteNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_refused_once_seats_are_booked() {
        let (svc, store) = setup().await;
        let bus = svc.add_bus(new_bus("Pokhara", Some(day(10)))).await.unwrap();
        book_one(&store, bus.id).await;
        let patch = BusPatch {
            fare: Some(25),
            ..Default::default()
        };
        assert!(matches!(
            svc.update_bus(bus.id, patch).await,
            Err(CoreError::SeatsAlreadyScheduled(_))
        ));
    }

    #[tokio::test]
    async fn test_listing_by_type() {
        let (svc, _) = setup().await;
        assert!(matches!(svc.list_all_buses().await, Err(CoreError::NotFound(_))));
        svc.add_bus(new_bus("Pokhara", None)).await.unwrap();
        assert_eq!(svc.list_buses_by_type("AC").await.unwrap().len(), 1);
        assert!(matches!(svc.list_buses_by_type("Deluxe").await, Err(CoreError::NotFound(_))));
        assert_eq!(svc.count_buses().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_matches_substrings_and_skips_departed() {
        let (svc, _) = setup().await;
        svc.add_bus(new_bus("Pokhara", Some(day(5)))).await.unwrap();
        svc.add_bus(new_bus("Pokhara", Some(day(20)))).await.unwrap();
        svc.add_bus(new_bus("Chitwan", Some(day(20)))).await.unwrap();
        let now = day(10).and_hms_opt(12, 0, 0).unwrap();

        let query = BusSearch {
            route_to: Some("pokh".into()),
            ..Default::default()
        };
        let found = svc.search_buses_at(&query, now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].journey_date, Some(day(20)));

        let by_date = BusSearch {
            route_from: Some("kathmandu".into()),
            journey_date: Some(day(20)),
            ..Default::default()
        };
        assert_eq!(svc.search_buses_at(&by_date, now).await.unwrap().len(), 2);

        assert!(matches!(
            svc.search_buses_at(&BusSearch::default(), now).await,
            Err(CoreError::Validation(_))
        ));
        let nothing = BusSearch {
            route_to: Some("Lumbini".into()),
            ..Default::default()
        };
        assert!(matches!(svc.search_buses_at(&nothing, now).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delay_shifts_schedule() {
        let (svc, _) = setup().await;
        let bus = svc.add_bus(new_bus("Pokhara", Some(day(10)))).await.unwrap();
        let now = day(9).and_hms_opt(12, 0, 0).unwrap();
        let delayed = svc.delay_departure_at(bus.id, 45, now).await.unwrap();
        assert_eq!(delayed.delay_minutes, 45);
        assert_eq!(delayed.departure_time, NaiveTime::from_hms_opt(7, 0, 0));
        assert_eq!(delayed.departs_at(), day(10).and_hms_opt(7, 45, 0));
        assert_eq!(delayed.expected_arrival(), NaiveTime::from_hms_opt(14, 45, 0));

        let stored = svc.view_bus(bus.id).await.unwrap();
        assert_eq!(stored.delay_minutes, 45);
        assert_eq!(stored.journey_date, Some(day(10)));
    }

    #[tokio::test]
    async fn test_delay_rejects_departed_or_unscheduled() {
        let (svc, _) = setup().await;
        let bus = svc.add_bus(new_bus("Pokhara", Some(day(10)))).await.unwrap();
        let unscheduled = svc.add_bus(new_bus("Chitwan", None)).await.unwrap();
        let later = day(11).and_hms_opt(0, 0, 0).unwrap();
        assert!(matches!(
            svc.delay_departure_at(bus.id, 30, later).await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            svc.delay_departure_at(unscheduled.id, 30, later).await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            svc.delay_departure_at(99, 30, later).await,
            Err(CoreError::BusNotFound(_))
        ));
    }
}
