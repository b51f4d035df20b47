//! User entity returned by the business-logic layer.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};
use utoipa::ToSchema;

use crate::error::GatewayError;

/// Timestamp layout used for `created_at` on the wire.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A persisted user.
///
/// Serialized as the broadcast payload and the REST response body.
/// `created_at` is rendered as `"YYYY-MM-DD HH:MM:SS"`, or `""` when the
/// row carries no timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    /// Database-assigned identifier.
    pub id: i32,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Creation time (server local, no zone).
    #[serde(serialize_with = "serialize_created_at", deserialize_with = "deserialize_created_at")]
    #[schema(value_type = String, example = "2024-01-01 00:00:00")]
    pub created_at: Option<NaiveDateTime>,
}

impl User {
    /// `"first last"`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Rejects names that are empty or whitespace only.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] when either name is blank.
pub fn validate_names(first_name: &str, last_name: &str) -> Result<(), GatewayError> {
    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(
            "first name and last name are required".to_string(),
        ));
    }
    Ok(())
}

fn serialize_created_at<S: Serializer>(
    value: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(ts) => serializer.collect_str(&ts.format(CREATED_AT_FORMAT)),
        None => serializer.serialize_str(""),
    }
}

fn deserialize_created_at<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(&raw, CREATED_AT_FORMAT)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ada(created_at: Option<NaiveDateTime>) -> User {
        User {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            created_at,
        }
    }

    #[test]
    fn serializes_timestamp_in_wire_layout() {
        let Some(ts) = NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        else {
            panic!("valid timestamp");
        };
        let Ok(json) = serde_json::to_string(&ada(Some(ts))) else {
            panic!("serializable");
        };
        assert_eq!(
            json,
            r#"{"id":1,"first_name":"Ada","last_name":"Lovelace","created_at":"2024-01-01 00:00:00"}"#
        );
    }

    #[test]
    fn unset_timestamp_is_empty_string() {
        let Ok(value) = serde_json::to_value(ada(None)) else {
            panic!("serializable");
        };
        assert_eq!(value["created_at"], "");
    }

    #[test]
    fn wire_layout_reads_back() {
        let raw = r#"{"id":4,"first_name":"Grace","last_name":"Hopper","created_at":"1952-05-01 09:30:00"}"#;
        let Ok(user) = serde_json::from_str::<User>(raw) else {
            panic!("deserializable");
        };
        assert_eq!(user.full_name(), "Grace Hopper");
        assert!(user.created_at.is_some());
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(validate_names("Ada", "Lovelace").is_ok());
        assert!(validate_names("", "Lovelace").is_err());
        assert!(validate_names("Ada", " \t ").is_err());
    }
}
