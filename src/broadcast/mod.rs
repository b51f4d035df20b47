//! Broadcast bus: low-latency pub/sub used purely for fan-out.
//!
//! The dispatcher publishes every business-logic result on one fixed
//! channel; each gateway instance subscribes to that channel and relays
//! payloads to its WebSocket sessions. Publishing is independent of the
//! durable log.
//!
//! Two implementations share the [`BroadcastPublisher`] surface and the
//! [`pump`] receive loop:
//!
//! - [`RedisBus`]: Redis `PUBLISH` / `SUBSCRIBE`, used by both binaries.
//! - [`InMemoryBus`]: a `tokio::broadcast` channel for tests and
//!   single-process wiring.

pub mod memory;
pub mod redis_bus;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use crate::error::GatewayError;

pub use memory::InMemoryBus;
pub use redis_bus::RedisBus;

/// One message on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    /// Channel name.
    pub channel: String,
    /// Serialized business-logic result.
    pub payload: String,
}

/// Publish side of the broadcast bus.
#[async_trait]
pub trait BroadcastPublisher: Send + Sync + std::fmt::Debug {
    /// Publishes `payload` on `channel`.
    ///
    /// Delivery is fire-and-forget: success means the bus accepted the
    /// message, not that anyone received it.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Broadcast`] if the bus rejects the publish.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), GatewayError>;
}

/// Why a subscription stream stopped yielding messages.
#[derive(Debug)]
pub enum SubscriptionEnd {
    /// The underlying connection went away; the caller may resubscribe.
    Disconnected,
    /// A non-recoverable error ended the subscription.
    Failed(GatewayError),
}

/// Drains a subscription stream, handing each payload to `handler` on a
/// freshly spawned task.
///
/// Handler execution never delays receipt of the next message. Returns
/// when the stream ends ([`SubscriptionEnd::Disconnected`]) or yields an
/// error ([`SubscriptionEnd::Failed`]).
pub async fn pump<S, H, Fut>(stream: S, handler: &Arc<H>) -> SubscriptionEnd
where
    S: Stream<Item = Result<String, GatewayError>>,
    H: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut stream = std::pin::pin!(stream);
    while let Some(item) = stream.next().await {
        match item {
            Ok(payload) => {
                let handler = Arc::clone(handler);
                tokio::spawn(async move { handler(payload).await });
            }
            Err(e) => return SubscriptionEnd::Failed(e),
        }
    }
    SubscriptionEnd::Disconnected
}
