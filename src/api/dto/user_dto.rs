//! User request bodies.

use serde::Deserialize;
use utoipa::ToSchema;

/// Body of `POST /api/v1/users/create`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    /// Given name. Must be non-empty.
    #[serde(default)]
    #[schema(example = "Ada")]
    pub first_name: String,
    /// Family name. Must be non-empty.
    #[serde(default)]
    #[schema(example = "Lovelace")]
    pub last_name: String,
}
