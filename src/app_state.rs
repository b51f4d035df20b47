//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::SessionRegistry;
use crate::eventlog::EventProducer;
use crate::service::UserOperations;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Business logic behind the REST endpoints.
    pub users: Arc<dyn UserOperations>,
    /// Live WebSocket sessions, shared with the broadcast subscription.
    pub sessions: Arc<SessionRegistry>,
    /// Durable-log producer for inbound client envelopes.
    pub producer: Arc<dyn EventProducer>,
    /// Bound on a single WebSocket write.
    pub session_write_timeout: Duration,
}
