//! In-process broadcast bus.
//!
//! [`InMemoryBus`] wraps a [`tokio::sync::broadcast`] channel carrying
//! [`BroadcastMessage`]s. It exposes the same publish surface as the Redis
//! bus, and its subscriptions run through the shared [`super::pump`] loop,
//! so handlers observe identical spawn-per-message behaviour.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{BroadcastMessage, BroadcastPublisher, SubscriptionEnd, pump};
use crate::error::GatewayError;

/// Broadcast bus backed by a `tokio::broadcast` ring buffer.
///
/// When the ring buffer is full, the oldest messages are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl InMemoryBus {
    /// Creates a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Runs `handler` for every message published on `channel`.
    ///
    /// Each message is handled on its own task. The returned handle
    /// resolves once every [`InMemoryBus`] clone has been dropped.
    pub fn subscribe<H, Fut>(&self, channel: &str, handler: H) -> JoinHandle<Result<(), GatewayError>>
    where
        H: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let rx = self.sender.subscribe();
        let channel = channel.to_string();
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            let messages = stream::unfold((rx, channel), |(mut rx, channel)| async move {
                loop {
                    match rx.recv().await {
                        Ok(msg) if msg.channel == channel => {
                            return Some((Ok::<_, GatewayError>(msg.payload), (rx, channel)));
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(lagged = n, %channel, "subscriber lagged behind bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            });

            match pump(messages, &handler).await {
                SubscriptionEnd::Disconnected => Ok(()),
                SubscriptionEnd::Failed(e) => Err(e),
            }
        })
    }

    /// Returns the current number of active subscriptions.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl BroadcastPublisher for InMemoryBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), GatewayError> {
        let receivers = self
            .sender
            .send(BroadcastMessage {
                channel: channel.to_string(),
                payload: payload.to_string(),
            })
            .unwrap_or(0);
        tracing::debug!(channel, receivers, "published to in-memory bus");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc;

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = InMemoryBus::new(16);
        assert!(bus.publish("users_actions", "{}").await.is_ok());
        assert_eq!(bus.receiver_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_only_its_channel() {
        let bus = InMemoryBus::new(16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bus.subscribe("users_actions", move |payload| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(payload);
            }
        });
        tokio::task::yield_now().await;
        assert_eq!(bus.receiver_count(), 1);

        let _ = bus.publish("other", "ignored").await;
        let _ = bus.publish("users_actions", r#"{"id":1}"#).await;

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        let Ok(Some(payload)) = received else {
            panic!("expected payload");
        };
        assert_eq!(payload, r#"{"id":1}"#);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscription_ends_cleanly_when_bus_dropped() {
        let bus = InMemoryBus::new(16);
        let sub = bus.subscribe("users_actions", |_| async {});
        drop(bus);
        let Ok(result) = tokio::time::timeout(Duration::from_secs(1), sub).await else {
            panic!("subscription did not finish");
        };
        assert!(matches!(result, Ok(Ok(()))));
    }
}
