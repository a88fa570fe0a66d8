use async_trait::async_trait;
use busline_core::models::{Admin, NewAdmin, NewUser, Passenger, PassengerDetails, Reservation, User};
use busline_core::repository::{AdminRepository, RepoResult, UserRepository};
use chrono::{DateTime, Utc};

use crate::pg_store::{
    reservations, unique_violation, AdminRow, PassengerRow, PgStore, ReservationRow, UserRow,
    USER_COLUMNS,
};

#[async_trait]
impl UserRepository for PgStore {
    async fn find_user(&self, id: i64) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {} FROM users u WHERE u.id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {} FROM users u WHERE u.email = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn insert_user(
        &self,
        user: NewUser,
        passenger: Option<PassengerDetails>,
    ) -> RepoResult<User> {
        let mut tx = self.pool.begin().await?;

        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO users (email, password_hash, user_name, first_name, last_name, phone_number)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, created_at
            "#,
        )
        .bind(&user.email)
        .bind(user.password_hash.expose())
        .bind(&user.user_name)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .fetch_one(&mut *tx)
        .await
        .map_err(unique_violation("users.email"))?;

        for role in &user.roles {
            sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(role.as_str())
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT $1, id FROM roles WHERE name = $2")
                .bind(id)
                .bind(role.as_str())
                .execute(&mut *tx)
                .await?;
        }

        if let Some(details) = passenger {
            sqlx::query(
                "INSERT INTO passengers (user_id, first_name, last_name, phone_number) VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(&details.first_name)
            .bind(&details.last_name)
            .bind(&details.phone_number)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            user_name: user.user_name,
            first_name: user.first_name,
            last_name: user.last_name,
            phone_number: user.phone_number,
            roles: user.roles,
            created_at,
        })
    }

    async fn update_password(&self, user_id: i64, password_hash: &str) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_user(&self, id: i64) -> RepoResult<Option<Vec<Reservation>>> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            DELETE FROM reservations
            WHERE passenger_id IN (SELECT id FROM passengers WHERE user_id = $1)
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let cancelled = reservations(rows)?;

        for r in &cancelled {
            sqlx::query(
                "UPDATE buses SET available_seats = LEAST(available_seats + $2, total_seats) WHERE id = $1",
            )
            .bind(r.bus_id)
            .bind(r.booked_seat)
            .execute(&mut *tx)
            .await?;
        }

        // passengers and user_roles cascade
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(cancelled))
    }

    async fn find_passenger(&self, id: i64) -> RepoResult<Option<Passenger>> {
        let row = sqlx::query_as::<_, PassengerRow>("SELECT * FROM passengers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Passenger::from))
    }

    async fn find_passenger_by_user(&self, user_id: i64) -> RepoResult<Option<Passenger>> {
        let row = sqlx::query_as::<_, PassengerRow>("SELECT * FROM passengers WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Passenger::from))
    }

    async fn upsert_passenger(
        &self,
        user_id: i64,
        details: PassengerDetails,
    ) -> RepoResult<Passenger> {
        let row = sqlx::query_as::<_, PassengerRow>(
            r#"
            INSERT INTO passengers (user_id, first_name, last_name, phone_number)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                phone_number = EXCLUDED.phone_number
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&details.first_name)
        .bind(&details.last_name)
        .bind(&details.phone_number)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_passengers(&self) -> RepoResult<Vec<Passenger>> {
        let rows = sqlx::query_as::<_, PassengerRow>("SELECT * FROM passengers ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Passenger::from).collect())
    }

    async fn count_passengers(&self) -> RepoResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passengers")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl AdminRepository for PgStore {
    async fn find_admin(&self, id: i64) -> RepoResult<Option<Admin>> {
        let row = sqlx::query_as::<_, AdminRow>("SELECT * FROM admins WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Admin::from))
    }

    async fn find_admin_by_email(&self, email: &str) -> RepoResult<Option<Admin>> {
        let row = sqlx::query_as::<_, AdminRow>("SELECT * FROM admins WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Admin::from))
    }

    async fn insert_admin(&self, admin: NewAdmin) -> RepoResult<Admin> {
        let row = sqlx::query_as::<_, AdminRow>(
            "INSERT INTO admins (user_name, email, password_hash) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&admin.user_name)
        .bind(&admin.email)
        .bind(admin.password_hash.expose())
        .fetch_one(&self.pool)
        .await
        .map_err(unique_violation("admins.email"))?;
        Ok(row.into())
    }

    async fn save_admin(&self, admin: &Admin) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE admins SET user_name = $2, email = $3, password_hash = $4 WHERE id = $1",
        )
        .bind(admin.id)
        .bind(&admin.user_name)
        .bind(&admin.email)
        .bind(admin.password_hash.expose())
        .execute(&self.pool)
        .await
        .map_err(unique_violation("admins.email"))?;
        Ok(result.rows_affected() == 1)
    }
}
