//! User handlers: create and fetch by id.
//!
//! These call the business-logic layer directly; they do not go through
//! the durable log and produce no broadcast.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::CreateUserRequest;
use crate::app_state::AppState;
use crate::domain::User;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /users/{id}`: Fetch a single user.
///
/// # Errors
///
/// Returns [`GatewayError`] if the id is not positive or no user matches.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "Users",
    summary = "Get user",
    description = "Returns the user with the given id.",
    params(("id" = i32, Path, description = "User id (positive)")),
    responses(
        (status = 200, description = "User found", body = User),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<User>, GatewayError> {
    let user = state.users.fetch_user_by_id(id).await?;
    Ok(Json(user))
}

/// `POST /users/create`: Create a user.
///
/// # Errors
///
/// Returns [`GatewayError`] if either name is empty or storage fails.
#[utoipa::path(
    post,
    path = "/api/v1/users/create",
    tag = "Users",
    summary = "Create user",
    description = "Persists a user and returns it with its assigned id and creation time.",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Missing first or last name", body = ErrorResponse),
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let user = state
        .users
        .create_user(&req.first_name, &req.last_name)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// User routes, mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/create", post(create_user))
        .route("/users/{id}", get(get_user))
}
