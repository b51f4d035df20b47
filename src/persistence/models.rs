//! Database models for users.

use chrono::NaiveDateTime;

use crate::domain::User;

/// A row from the `users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    /// `SERIAL` primary key.
    pub id: i32,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Insertion timestamp; `NULL` when the column default was bypassed.
    pub created_at: Option<NaiveDateTime>,
}

impl From<(i32, String, String, Option<NaiveDateTime>)> for UserRow {
    fn from(
        (id, first_name, last_name, created_at): (i32, String, String, Option<NaiveDateTime>),
    ) -> Self {
        Self {
            id,
            first_name,
            last_name,
            created_at,
        }
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_without_timestamp_maps_to_user() {
        let row = UserRow::from((7, "Grace".to_string(), "Hopper".to_string(), None));
        let user = User::from(row);
        assert_eq!(user.id, 7);
        assert_eq!(user.full_name(), "Grace Hopper");
        assert!(user.created_at.is_none());
    }
}
