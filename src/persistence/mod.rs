//! Persistence layer: PostgreSQL user storage.
//!
//! [`PostgresUserRepository`] owns the `sqlx::PgPool` used by the
//! business-logic layer. The `users` table is created at startup if
//! missing.

pub mod models;
pub mod postgres;

pub use postgres::PostgresUserRepository;
