//! User service: validation in front of user storage.

use async_trait::async_trait;

use crate::domain::User;
pub use crate::domain::user::validate_names;
use crate::error::GatewayError;
use crate::persistence::PostgresUserRepository;

/// Business-logic operations on users.
///
/// Shared by the dispatcher (log-driven) and the REST handlers.
#[async_trait]
pub trait UserOperations: Send + Sync + std::fmt::Debug {
    /// Persists a new user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] when either name is empty
    /// and [`GatewayError::PersistenceError`] on storage failure.
    async fn create_user(&self, first_name: &str, last_name: &str) -> Result<User, GatewayError>;

    /// Loads a single user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] when `id` is not positive,
    /// [`GatewayError::UserNotFound`] when absent, and
    /// [`GatewayError::PersistenceError`] on storage failure.
    async fn fetch_user_by_id(&self, id: i32) -> Result<User, GatewayError>;

    /// Loads every user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn list_users(&self) -> Result<Vec<User>, GatewayError>;
}

/// PostgreSQL-backed [`UserOperations`].
#[derive(Debug, Clone)]
pub struct UserService {
    repository: PostgresUserRepository,
}

impl UserService {
    /// Creates a service over `repository`.
    #[must_use]
    pub fn new(repository: PostgresUserRepository) -> Self {
        Self { repository }
    }
}

/// Rejects non-positive ids.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] when `id` is zero or negative.
pub fn validate_id(id: i32) -> Result<(), GatewayError> {
    if id <= 0 {
        return Err(GatewayError::InvalidRequest(format!(
            "user id must be positive, got {id}"
        )));
    }
    Ok(())
}

#[async_trait]
impl UserOperations for UserService {
    async fn create_user(&self, first_name: &str, last_name: &str) -> Result<User, GatewayError> {
        validate_names(first_name, last_name)?;
        let user = self.repository.create_user(first_name, last_name).await?;
        tracing::info!(user_id = user.id, "user created");
        Ok(user)
    }

    async fn fetch_user_by_id(&self, id: i32) -> Result<User, GatewayError> {
        validate_id(id)?;
        self.repository.fetch_user_by_id(id).await
    }

    async fn list_users(&self) -> Result<Vec<User>, GatewayError> {
        let users = self.repository.fetch_all_users().await?;
        tracing::debug!(count = users.len(), "users listed");
        Ok(users)
    }
}
