use async_trait::async_trait;
use busline_core::models::{Bus, NewBus, NewRoute, Route};
use busline_core::repository::{BusRepository, RepoResult, RouteRepository};

use crate::pg_store::{unique_violation, BusRow, PgStore, RouteRow, BUS_SELECT};

#[async_trait]
impl RouteRepository for PgStore {
    async fn find_route(&self, id: i64) -> RepoResult<Option<Route>> {
        let row = sqlx::query_as::<_, RouteRow>("SELECT * FROM routes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Route::from))
    }

    async fn find_route_by_endpoints(&self, from: &str, to: &str) -> RepoResult<Option<Route>> {
        let row = sqlx::query_as::<_, RouteRow>(
            "SELECT * FROM routes WHERE route_from = $1 AND route_to = $2",
        )
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Route::from))
    }

    async fn list_routes(&self) -> RepoResult<Vec<Route>> {
        let rows = sqlx::query_as::<_, RouteRow>("SELECT * FROM routes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Route::from).collect())
    }

    async fn insert_route(&self, route: NewRoute) -> RepoResult<Route> {
        let row = sqlx::query_as::<_, RouteRow>(
            "INSERT INTO routes (route_from, route_to, distance) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&route.route_from)
        .bind(&route.route_to)
        .bind(route.distance)
        .fetch_one(&self.pool)
        .await
        .map_err(unique_violation("routes.endpoints"))?;
        Ok(row.into())
    }

    async fn save_route(&self, route: &Route) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE routes SET route_from = $2, route_to = $3, distance = $4
            WHERE id = $1 AND NOT EXISTS (SELECT 1 FROM buses WHERE route_id = $1)
            "#,
        )
        .bind(route.id)
        .bind(&route.route_from)
        .bind(&route.route_to)
        .bind(route.distance)
        .execute(&self.pool)
        .await
        .map_err(unique_violation("routes.endpoints"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_route(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query(
            "DELETE FROM routes WHERE id = $1 AND NOT EXISTS (SELECT 1 FROM buses WHERE route_id = $1)",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_routes(&self) -> RepoResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM routes")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl BusRepository for PgStore {
    async fn find_bus(&self, id: i64) -> RepoResult<Option<Bus>> {
        let sql = format!("{} WHERE b.id = $1", BUS_SELECT);
        let row = sqlx::query_as::<_, BusRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Bus::from))
    }

    async fn list_buses(&self) -> RepoResult<Vec<Bus>> {
        let sql = format!("{} ORDER BY b.id", BUS_SELECT);
        let rows = sqlx::query_as::<_, BusRow>(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Bus::from).collect())
    }

    async fn list_buses_by_type(&self, bus_type: &str) -> RepoResult<Vec<Bus>> {
        let sql = format!("{} WHERE b.bus_type = $1 ORDER BY b.id", BUS_SELECT);
        let rows = sqlx::query_as::<_, BusRow>(&sql)
            .bind(bus_type)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Bus::from).collect())
    }

    async fn list_buses_on_route(&self, route_id: i64) -> RepoResult<Vec<Bus>> {
        let sql = format!("{} WHERE b.route_id = $1 ORDER BY b.id", BUS_SELECT);
        let rows = sqlx::query_as::<_, BusRow>(&sql)
            .bind(route_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Bus::from).collect())
    }

    async fn insert_bus(&self, route: &Route, bus: NewBus) -> RepoResult<Bus> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO buses (route_id, bus_name, driver_name, bus_type, journey_date,
                               departure_time, arrival_time, total_seats, available_seats, fare)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9)
            RETURNING id
            "#,
        )
        .bind(route.id)
        .bind(&bus.bus_name)
        .bind(&bus.driver_name)
        .bind(&bus.bus_type)
        .bind(bus.journey_date)
        .bind(bus.departure_time)
        .bind(bus.arrival_time)
        .bind(bus.total_seats)
        .bind(bus.fare)
        .fetch_one(&self.pool)
        .await?;

        Ok(Bus {
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
        })
    }

    async fn update_bus_if_unbooked(&self, bus: &Bus) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE buses
            SET route_id = $2, bus_name = $3, driver_name = $4, bus_type = $5,
                journey_date = $6, departure_time = $7, arrival_time = $8,
                total_seats = $9, available_seats = $10, fare = $11, delay_minutes = $12
            WHERE id = $1 AND available_seats = total_seats
            "#,
        )
        .bind(bus.id)
        .bind(bus.route_id)
        .bind(&bus.bus_name)
        .bind(&bus.driver_name)
        .bind(&bus.bus_type)
        .bind(bus.journey_date)
        .bind(bus.departure_time)
        .bind(bus.arrival_time)
        .bind(bus.total_seats)
        .bind(bus.available_seats)
        .bind(bus.fare)
        .bind(bus.delay_minutes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_bus_if_unbooked(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM buses
            WHERE id = $1 AND available_seats = total_seats
              AND NOT EXISTS (SELECT 1 FROM reservations WHERE bus_id = $1)
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn reschedule_bus(&self, bus: &Bus) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE buses
            SET journey_date = $2, departure_time = $3, arrival_time = $4, delay_minutes = $5
            WHERE id = $1
            "#,
        )
        .bind(bus.id)
        .bind(bus.journey_date)
        .bind(bus.departure_time)
        .bind(bus.arrival_time)
        .bind(bus.delay_minutes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_buses(&self) -> RepoResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM buses")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
