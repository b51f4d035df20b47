//! PostgreSQL implementation of user storage.

use std::time::Duration;

use chrono::NaiveDateTime;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::UserRow;
use crate::config::GatewayConfig;
use crate::domain::User;
use crate::error::GatewayError;

/// Longest a pooled connection is kept before being recycled.
const MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Longest a connection may sit idle in the pool.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const CREATE_USERS_TABLE: &str = "CREATE TABLE IF NOT EXISTS users (\
     id SERIAL PRIMARY KEY, \
     first_name VARCHAR(255) NOT NULL, \
     last_name VARCHAR(255) NOT NULL, \
     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)";

type RawUser = (i32, String, String, Option<NaiveDateTime>);

/// PostgreSQL-backed user repository using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool sized from `config` and verifies connectivity.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] if the database is
    /// unreachable.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let pool = pool_options(config)
            .connect(&config.database_url)
            .await
            .map_err(|e| GatewayError::PersistenceError(format!("failed to connect: {e}")))?;

        tracing::info!(
            max_connections = config.database_max_connections,
            min_connections = config.database_min_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self::new(pool))
    }

    /// Creates the `users` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn ensure_schema(&self) -> Result<(), GatewayError> {
        sqlx::query(CREATE_USERS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;
        Ok(())
    }

    /// Inserts a user and returns it with its assigned id and timestamp.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn create_user(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, GatewayError> {
        let row = sqlx::query_as::<_, RawUser>(
            "INSERT INTO users (first_name, last_name) VALUES ($1, $2) \
             RETURNING id, first_name, last_name, created_at",
        )
        .bind(first_name)
        .bind(last_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        Ok(User::from(UserRow::from(row)))
    }

    /// Loads a single user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UserNotFound`] when no row matches and
    /// [`GatewayError::PersistenceError`] on database failure.
    pub async fn fetch_user_by_id(&self, id: i32) -> Result<User, GatewayError> {
        let row = sqlx::query_as::<_, RawUser>(
            "SELECT id, first_name, last_name, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        row.map(|r| User::from(UserRow::from(r)))
            .ok_or(GatewayError::UserNotFound(id))
    }

    /// Loads every user ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn fetch_all_users(&self) -> Result<Vec<User>, GatewayError> {
        let rows = sqlx::query_as::<_, RawUser>(
            "SELECT id, first_name, last_name, created_at FROM users ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| User::from(UserRow::from(r)))
            .collect())
    }
}

/// Pool sizing and connection recycling for the relay.
fn pool_options(config: &GatewayConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .max_lifetime(MAX_LIFETIME)
        .idle_timeout(IDLE_TIMEOUT)
}
