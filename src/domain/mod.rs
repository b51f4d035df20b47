//! Domain layer: wire envelope, typed user events, the user entity, and
//! the session registry.
//!
//! Nothing here talks to Kafka or Redis; transports live in
//! [`crate::eventlog`] and [`crate::broadcast`].

pub mod envelope;
pub mod session_id;
pub mod session_registry;
pub mod user;
pub mod user_event;

pub use envelope::Envelope;
pub use session_id::SessionId;
pub use session_registry::{BroadcastReport, SessionRegistry, SessionSink};
pub use user::User;
pub use user_event::{UserEvent, UserTopic};
