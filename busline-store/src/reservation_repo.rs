use async_trait::async_trait;
use busline_core::models::{BookingOutcome, Reservation, ReservationDraft};
use busline_core::repository::{RepoResult, ReservationRepository};
use chrono::NaiveDate;
use sqlx::{Postgres, Transaction};

use crate::pg_store::{reservations, PgStore, ReservationRow};

/// Conditional debit; `Some(outcome)` describes why nothing was debited.
async fn debit(
    tx: &mut Transaction<'_, Postgres>,
    bus_id: i64,
    seats: i32,
) -> RepoResult<Option<BookingOutcome>> {
    let debited: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE buses SET available_seats = available_seats - $2
        WHERE id = $1 AND available_seats >= $2
        RETURNING available_seats
        "#,
    )
    .bind(bus_id)
    .bind(seats)
    .fetch_optional(&mut **tx)
    .await?;

    if debited.is_some() {
        return Ok(None);
    }

    let available: Option<i32> = sqlx::query_scalar("SELECT available_seats FROM buses WHERE id = $1")
        .bind(bus_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(Some(match available {
        Some(available) => BookingOutcome::InsufficientSeats { available },
        None => BookingOutcome::BusMissing,
    }))
}

async fn credit(tx: &mut Transaction<'_, Postgres>, bus_id: i64, seats: i32) -> RepoResult<()> {
    sqlx::query(
        "UPDATE buses SET available_seats = LEAST(available_seats + $2, total_seats) WHERE id = $1",
    )
    .bind(bus_id)
    .bind(seats)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl ReservationRepository for PgStore {
    async fn find_reservation(&self, id: i64) -> RepoResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Reservation::try_from).transpose()
    }

    async fn list_reservations(&self) -> RepoResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>("SELECT * FROM reservations ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        reservations(rows)
    }

    async fn reservations_for_passenger(&self, passenger_id: i64) -> RepoResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            "SELECT * FROM reservations WHERE passenger_id = $1 ORDER BY id",
        )
        .bind(passenger_id)
        .fetch_all(&self.pool)
        .await?;
        reservations(rows)
    }

    async fn reservations_for_bus(&self, bus_id: i64) -> RepoResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            "SELECT * FROM reservations WHERE bus_id = $1 ORDER BY id",
        )
        .bind(bus_id)
        .fetch_all(&self.pool)
        .await?;
        reservations(rows)
    }

    async fn count_reservations_on(&self, date: NaiveDate) -> RepoResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE journey_date = $1")
            .bind(date)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn book(&self, draft: ReservationDraft) -> RepoResult<BookingOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(refused) = debit(&mut tx, draft.bus_id, draft.booked_seat).await? {
            return Ok(refused);
        }

        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            INSERT INTO reservations (passenger_id, bus_id, departure_location, destination,
                                      journey_date, booked_seat, fare, status, booked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(draft.passenger_id)
        .bind(draft.bus_id)
        .bind(&draft.departure_location)
        .bind(&draft.destination)
        .bind(draft.journey_date)
        .bind(draft.booked_seat)
        .bind(draft.fare)
        .bind(draft.status.as_str())
        .bind(draft.booked_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(BookingOutcome::Confirmed(row.try_into()?))
    }

    async fn cancel(&self, id: i64) -> RepoResult<Option<Reservation>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ReservationRow>("DELETE FROM reservations WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let reservation = Reservation::try_from(row)?;
        credit(&mut tx, reservation.bus_id, reservation.booked_seat).await?;

        tx.commit().await?;
        Ok(Some(reservation))
    }

    async fn rebook(&self, id: i64, draft: ReservationDraft) -> RepoResult<BookingOutcome> {
        let mut tx = self.pool.begin().await?;

        let old = sqlx::query_as::<_, ReservationRow>("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(old) = old else {
            return Ok(BookingOutcome::ReservationMissing);
        };
        let old = Reservation::try_from(old)?;

        // Rolled back with the transaction if the new debit is refused.
        credit(&mut tx, old.bus_id, old.booked_seat).await?;
        if let Some(refused) = debit(&mut tx, draft.bus_id, draft.booked_seat).await? {
            return Ok(refused);
        }

        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            UPDATE reservations
            SET passenger_id = $2, bus_id = $3, departure_location = $4, destination = $5,
                journey_date = $6, booked_seat = $7, fare = $8, status = $9, booked_at = $10
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(draft.passenger_id)
        .bind(draft.bus_id)
        .bind(&draft.departure_location)
        .bind(&draft.destination)
        .bind(draft.journey_date)
        .bind(draft.booked_seat)
        .bind(draft.fare)
        .bind(draft.status.as_str())
        .bind(draft.booked_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(BookingOutcome::Confirmed(row.try_into()?))
    }
}
