//! Wire-level event envelope exchanged with WebSocket clients.
//!
//! Every inbound frame is a JSON object `{ "event", "type", "data" }`. The
//! `event` field names the aggregate (e.g. `"user"`), `type` names the
//! operation (e.g. `"created"`), and `data` is opaque to the gateway.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Separator between the event and type parts of a log topic.
pub const TOPIC_SEPARATOR: char = '.';

/// Longest topic name the log accepts.
pub const MAX_TOPIC_LEN: usize = 249;

/// Event envelope as sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Domain aggregate name.
    pub event: String,
    /// Operation name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Operation payload, forwarded untouched.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Parses and validates a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if the frame is not a JSON
    /// envelope, if `event` or `type` is empty, or if the derived topic is
    /// not a legal log topic name (`[A-Za-z0-9._-]`, at most
    /// [`MAX_TOPIC_LEN`] bytes).
    pub fn parse(frame: &str) -> Result<Self, GatewayError> {
        let envelope: Self = serde_json::from_str(frame)
            .map_err(|e| GatewayError::InvalidRequest(format!("malformed envelope: {e}")))?;
        if envelope.event.trim().is_empty() || envelope.kind.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "envelope event and type must be non-empty".to_string(),
            ));
        }
        validate_topic(&envelope.topic())?;
        Ok(envelope)
    }

    /// Log topic derived from the envelope: `"<event>.<type>"`.
    #[must_use]
    pub fn topic(&self) -> String {
        format!("{}{TOPIC_SEPARATOR}{}", self.event, self.kind)
    }
}

fn validate_topic(topic: &str) -> Result<(), GatewayError> {
    if topic.len() > MAX_TOPIC_LEN {
        return Err(GatewayError::InvalidRequest(format!(
            "topic exceeds {MAX_TOPIC_LEN} characters"
        )));
    }
    let legal = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    if let Some(bad) = topic.chars().find(|c| !legal(*c)) {
        return Err(GatewayError::InvalidRequest(format!(
            "illegal character {bad:?} in topic {topic:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn topic_joins_event_and_type() {
        let Ok(env) = Envelope::parse(r#"{"event":"user","type":"created","data":{}}"#) else {
            panic!("valid envelope");
        };
        assert_eq!(env.topic(), "user.created");
    }

    #[test]
    fn field_order_does_not_matter() {
        let Ok(env) = Envelope::parse(
            r#"{"type":"fetch","event":"user","data":{"user_id":3}}"#,
        ) else {
            panic!("valid envelope");
        };
        assert_eq!(env.topic(), "user.fetch");
        assert_eq!(env.data["user_id"], 3);
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let Ok(env) = Envelope::parse(r#"{"event":"user","type":"read"}"#) else {
            panic!("valid envelope");
        };
        assert!(env.data.is_null());
    }

    #[test]
    fn rejects_non_json() {
        assert!(Envelope::parse("not json").is_err());
    }

    #[test]
    fn rejects_empty_event_or_type() {
        assert!(Envelope::parse(r#"{"event":"","type":"created"}"#).is_err());
        assert!(Envelope::parse(r#"{"event":"user","type":"  "}"#).is_err());
    }

    #[test]
    fn rejects_missing_type() {
        assert!(Envelope::parse(r#"{"event":"user","data":{}}"#).is_err());
    }

    #[test]
    fn rejects_illegal_topic_characters() {
        assert!(Envelope::parse(r#"{"event":"user","type":"created now"}"#).is_err());
        assert!(Envelope::parse(r#"{"event":"us/er","type":"created"}"#).is_err());
        assert!(Envelope::parse(r#"{"event":"usér","type":"created"}"#).is_err());
        assert!(Envelope::parse(r#"{"event":"user_v2","type":"re-read"}"#).is_ok());
    }

    #[test]
    fn rejects_overlong_topic() {
        let kind = "x".repeat(MAX_TOPIC_LEN - "user.".len());
        let at_limit = serde_json::json!({"event": "user", "type": kind}).to_string();
        assert!(Envelope::parse(&at_limit).is_ok());

        let over = serde_json::json!({"event": "user", "type": format!("{kind}x")}).to_string();
        assert!(Envelope::parse(&over).is_err());
    }
}
