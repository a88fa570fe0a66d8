use std::sync::Arc;

use busline_core::models::{NewRoute, Route, RoutePatch};
use busline_core::repository::{is_duplicate, BusRepository, RepoError, RouteRepository};
use busline_core::{CoreError, CoreResult};

pub struct RouteService {
    routes: Arc<dyn RouteRepository>,
    buses: Arc<dyn BusRepository>,
}

fn validate(route_from: &str, route_to: &str, distance: i32) -> CoreResult<()> {
    if route_from.trim().is_empty() || route_to.trim().is_empty() {
        return Err(CoreError::Validation("route endpoints must not be empty".into()));
    }
    if route_from == route_to {
        return Err(CoreError::Validation("a route must connect two different places".into()));
    }
    if distance <= 0 {
        return Err(CoreError::Validation("distance must be positive".into()));
    }
    Ok(())
}

fn taken_endpoints(route_from: &str, route_to: &str) -> impl FnOnce(RepoError) -> CoreError {
    let (from, to) = (route_from.to_string(), route_to.to_string());
    move |err| {
        if is_duplicate(&err) {
            CoreError::DuplicateRoute { from, to }
        } else {
            err.into()
        }
    }
}

impl RouteService {
    pub fn new(routes: Arc<dyn RouteRepository>, buses: Arc<dyn BusRepository>) -> Self {
        Self { routes, buses }
    }

    pub async fn add_route(&self, route: NewRoute) -> CoreResult<Route> {
        validate(&route.route_from, &route.route_to, route.distance)?;
        if self
            .routes
            .find_route_by_endpoints(&route.route_from, &route.route_to)
            .await?
            .is_some()
        {
            return Err(CoreError::DuplicateRoute {
                from: route.route_from,
                to: route.route_to,
            });
        }
        let taken = taken_endpoints(&route.route_from, &route.route_to);
        let route = self.routes.insert_route(route).await.map_err(taken)?;
        tracing::info!(route_id = route.id, "added route {} -> {}", route.route_from, route.route_to);
        Ok(route)
    }

    pub async fn view_route(&self, id: i64) -> CoreResult<Route> {
        self.routes
            .find_route(id)
            .await?
            .ok_or_else(|| CoreError::RouteNotFound(id.to_string()))
    }

    async fn ensure_no_buses(&self, route_id: i64) -> CoreResult<()> {
        if self.buses.list_buses_on_route(route_id).await?.is_empty() {
            Ok(())
        } else {
            Err(CoreError::RouteHasBuses(route_id))
        }
    }

    pub async fn update_route(&self, id: i64, patch: RoutePatch) -> CoreResult<Route> {
        let mut route = self.view_route(id).await?;
        self.ensure_no_buses(id).await?;

        if let Some(from) = patch.route_from {
            route.route_from = from;
        }
        if let Some(to) = patch.route_to {
            route.route_to = to;
        }
        if let Some(distance) = patch.distance {
            route.distance = distance;
        }
        validate(&route.route_from, &route.route_to, route.distance)?;

        if let Some(other) = self
            .routes
            .find_route_by_endpoints(&route.route_from, &route.route_to)
            .await?
        {
            if other.id != id {
                return Err(CoreError::DuplicateRoute {
                    from: route.route_from,
                    to: route.route_to,
                });
            }
        }

        let saved = self
            .routes
            .save_route(&route)
            .await
            .map_err(taken_endpoints(&route.route_from, &route.route_to))?;
        if !saved {
            // Deleted or given a bus since the checks above.
            self.view_route(id).await?;
            return Err(CoreError::RouteHasBuses(id));
        }
        Ok(route)
    }

    pub async fn delete_route(&self, id: i64) -> CoreResult<Route> {
        let route = self.view_route(id).await?;
        self.ensure_no_buses(id).await?;
        if !self.routes.delete_route(id).await? {
            self.view_route(id).await?;
            return Err(CoreError::RouteHasBuses(id));
        }
        tracing::info!(route_id = id, "deleted route");
        Ok(route)
    }

    pub async fn list_all_routes(&self) -> CoreResult<Vec<Route>> {
        let routes = self.routes.list_routes().await?;
        if routes.is_empty() {
            return Err(CoreError::NotFound("No routes found".into()));
        }
        Ok(routes)
    }

    pub async fn count_routes(&self) -> CoreResult<i64> {
        match self.routes.count_routes().await? {
            0 => Err(CoreError::NotFound("No routes found".into())),
            n => Ok(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_core::models::NewBus;
    use busline_store::MemoryStore;

    fn service() -> (RouteService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (RouteService::new(store.clone(), store.clone()), store)
    }

    fn route(from: &str, to: &str) -> NewRoute {
        NewRoute {
            route_from: from.into(),
            route_to: to.into(),
            distance: 100,
        }
    }

    fn express() -> NewBus {
        NewBus {
            route_from: "A".into(),
            route_to: "B".into(),
            bus_name: "Express".into(),
            driver_name: "Ram".into(),
            bus_type: "AC".into(),
            journey_date: None,
            departure_time: None,
            arrival_time: None,
            total_seats: 50,
            fare: 20,
        }
    }

    #[tokio::test]
    async fn test_duplicate_route_is_rejected() {
        let (svc, _) = service();
        svc.add_route(route("A", "B")).await.unwrap();
        let err = svc.add_route(route("A", "B")).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateRoute { .. }));
        // reverse direction is a different route
        svc.add_route(route("B", "A")).await.unwrap();
        assert_eq!(svc.count_routes().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_listing_is_an_error() {
        let (svc, _) = service();
        assert!(matches!(svc.list_all_routes().await, Err(CoreError::NotFound(_))));
        assert!(matches!(svc.count_routes().await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_route_with_buses_is_locked() {
        let (svc, store) = service();
        let r = svc.add_route(route("A", "B")).await.unwrap();
        store.insert_bus(&r, express()).await.unwrap();

        let patch = RoutePatch {
            distance: Some(120),
            ..Default::default()
        };
        assert!(matches!(svc.update_route(r.id, patch).await, Err(CoreError::RouteHasBuses(_))));
        assert!(matches!(svc.delete_route(r.id).await, Err(CoreError::RouteHasBuses(_))));
    }

    #[tokio::test]
    async fn test_store_refuses_update_when_bus_attached_after_check() {
        let store = Arc::new(MemoryStore::new());
        // An empty bus listing lets the service-level check pass while the
        // route store already holds a bus.
        let svc = RouteService::new(store.clone(), Arc::new(MemoryStore::new()));
        let r = svc.add_route(route("A", "B")).await.unwrap();
        store.insert_bus(&r, express()).await.unwrap();

        let patch = RoutePatch {
            distance: Some(120),
            ..Default::default()
        };
        assert!(matches!(svc.update_route(r.id, patch).await, Err(CoreError::RouteHasBuses(_))));
        assert_eq!(svc.view_route(r.id).await.unwrap().distance, 100);
        assert!(matches!(svc.delete_route(r.id).await, Err(CoreError::RouteHasBuses(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_of_same_route_yield_one() {
        let (svc, _) = service();
        let svc = Arc::new(svc);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move { svc.add_route(route("A", "B")).await }));
        }
        let mut added = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => added += 1,
                Err(err) => assert!(matches!(err, CoreError::DuplicateRoute { .. }), "{err:?}"),
            }
        }
        assert_eq!(added, 1);
    }

    #[tokio::test]
    async fn test_update_applies_partial_patch() {
        let (svc, _) = service();
        let r = svc.add_route(route("A", "B")).await.unwrap();
        let updated = svc
            .update_route(
                r.id,
                RoutePatch {
                    distance: Some(150),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.route_from, "A");
        assert_eq!(updated.distance, 150);
    }

    #[tokio::test]
    async fn test_update_cannot_collide_with_existing_route() {
        let (svc, _) = service();
        svc.add_route(route("A", "B")).await.unwrap();
        let c = svc.add_route(route("A", "C")).await.unwrap();
        let patch = RoutePatch {
            route_to: Some("B".into()),
            ..Default::default()
        };
        assert!(matches!(svc.update_route(c.id, patch).await, Err(CoreError::DuplicateRoute { .. })));
    }

    #[tokio::test]
    async fn test_delete_unknown_route() {
        let (svc, _) = service();
        assert!(matches!(svc.delete_route(9).await, Err(CoreError::RouteNotFound(_))));
    }
}
