//! Typed domain events decoded from consumed log messages.
//!
//! Each log topic maps to exactly one event type. A log message value is
//! the raw client envelope; the topic already carries `event` and `type`,
//! so only the `data` field is typed here.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::user::validate_names;
use crate::error::GatewayError;

/// Topics the dispatcher knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserTopic {
    /// `user.created`: create a user.
    Created,
    /// `user.fetch`: fetch one user by id.
    Fetch,
    /// `user.read`: list every user.
    Read,
}

impl UserTopic {
    /// All handled topics, in subscription order.
    pub const ALL: [Self; 3] = [Self::Created, Self::Fetch, Self::Read];

    /// Topic name on the log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "user.created",
            Self::Fetch => "user.fetch",
            Self::Read => "user.read",
        }
    }
}

impl fmt::Display for UserTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserTopic {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("unsupported topic: {s}")))
    }
}

/// Typed view of an envelope's `data` field. Other envelope fields are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope<T> {
    /// Typed payload.
    pub data: T,
}

/// Payload of `user.created`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserCreatedData {
    /// Given name.
    #[serde(default)]
    pub first_name: String,
    /// Family name.
    #[serde(default)]
    pub last_name: String,
}

/// Payload of `user.fetch`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserFetchData {
    /// Requested user id.
    #[serde(default)]
    pub user_id: i64,
}

/// Payload of `user.read`; any object is accepted.
pub type UserReadData = serde_json::Map<String, serde_json::Value>;

/// A decoded and validated user event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    /// Create a user with the given names.
    Created {
        /// Given name.
        first_name: String,
        /// Family name.
        last_name: String,
    },
    /// Fetch a single user.
    FetchById {
        /// Requested user id.
        user_id: i32,
    },
    /// List all users.
    ReadAll,
}

impl UserEvent {
    /// Decodes and validates a log message value for the given topic.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] when the value is not valid
    /// JSON for the topic or a required field is empty or non-positive.
    pub fn decode(topic: UserTopic, value: &[u8]) -> Result<Self, GatewayError> {
        match topic {
            UserTopic::Created => {
                let env: EventEnvelope<UserCreatedData> = decode_json(value)?;
                let UserCreatedData {
                    first_name,
                    last_name,
                } = env.data;
                validate_names(&first_name, &last_name)?;
                Ok(Self::Created {
                    first_name,
                    last_name,
                })
            }
            UserTopic::Fetch => {
                let env: EventEnvelope<UserFetchData> = decode_json(value)?;
                let user_id = i32::try_from(env.data.user_id)
                    .ok()
                    .filter(|id| *id > 0)
                    .ok_or_else(|| {
                        GatewayError::InvalidRequest(format!(
                            "invalid user id: {}",
                            env.data.user_id
                        ))
                    })?;
                Ok(Self::FetchById { user_id })
            }
            UserTopic::Read => {
                let _: EventEnvelope<Option<UserReadData>> = decode_json(value)?;
                Ok(Self::ReadAll)
            }
        }
    }
}

fn decode_json<'a, T: Deserialize<'a>>(value: &'a [u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(value)
        .map_err(|e| GatewayError::InvalidRequest(format!("undecodable event: {e}")))
}
