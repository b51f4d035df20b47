//! Type-safe WebSocket session identifier.
//!
//! [`SessionId`] is a newtype wrapper around [`uuid::Uuid`] (v4) so that
//! session handles cannot be confused with other UUIDs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle to one live WebSocket connection.
///
/// Generated when the connection is upgraded and used as the key in
/// [`super::SessionRegistry`]. The socket read loop keeps only this id;
/// the registry owns the write half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Creates a new random `SessionId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
