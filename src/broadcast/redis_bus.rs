//! Redis pub/sub implementation of the broadcast bus.
//!
//! Publishing goes through a shared [`ConnectionManager`] (which reconnects
//! on its own). Subscriptions open a dedicated pub/sub connection per
//! channel and feed it through [`super::pump`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, RedisError};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{BroadcastPublisher, SubscriptionEnd, pump};
use crate::error::GatewayError;

/// Delay before re-opening a subscription whose connection dropped.
pub const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(1);

/// How a Redis error affects a running subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The connection broke; resubscribe in place.
    ConnectionLost,
    /// Anything else; the subscription terminates.
    Fatal,
}

/// Classifies a Redis error for the subscribe loop.
#[must_use]
pub fn classify(err: &RedisError) -> FaultKind {
    if err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_io_error()
        || err.is_timeout()
    {
        FaultKind::ConnectionLost
    } else {
        FaultKind::Fatal
    }
}

/// Redis-backed broadcast bus.
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    conn: ConnectionManager,
    url: String,
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus").field("url", &self.url).finish()
    }
}

impl RedisBus {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Broadcast`] if the URL is invalid or the
    /// initial connection fails.
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let client = Client::open(url)
            .map_err(|e| GatewayError::Broadcast(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| GatewayError::Broadcast(format!("failed to connect to redis: {e}")))?;

        info!(url = %url, "Connected to Redis");

        Ok(Self {
            client,
            conn,
            url: url.to_string(),
        })
    }

    /// Runs `handler` for every message published on `channel`.
    ///
    /// The loop runs on its own task and each message is handled on a
    /// further task. A dropped connection is resubscribed after
    /// [`RESUBSCRIBE_BACKOFF`]; any other error ends the loop and is
    /// returned through the join handle. Payloads that are not valid UTF-8
    /// are relayed with replacement characters.
    pub fn subscribe<H, Fut>(&self, channel: &str, handler: H) -> JoinHandle<Result<(), GatewayError>>
    where
        H: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let client = self.client.clone();
        let channel = channel.to_string();
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            let target = channel.clone();
            let open = move || {
                let client = client.clone();
                let channel = target.clone();
                async move {
                    let mut pubsub = client.get_async_pubsub().await?;
                    pubsub.subscribe(&channel).await?;
                    Ok::<_, RedisError>(pubsub.into_on_message().map(|msg| {
                        Ok::<_, GatewayError>(payload_text(msg.get_payload_bytes()))
                    }))
                }
            };
            run_subscription(&channel, RESUBSCRIBE_BACKOFF, open, handler).await
        })
    }
}

/// Subscribe loop behind [`RedisBus::subscribe`].
///
/// `open` establishes one subscription and returns its message stream.
/// Connection-level failures, whether from `open` or a stream that ends,
/// are retried after `backoff`; a fatal `open` error or an error item
/// ends the loop.
pub(crate) async fn run_subscription<C, CFut, S, H, Fut>(
    channel: &str,
    backoff: Duration,
    mut open: C,
    handler: Arc<H>,
) -> Result<(), GatewayError>
where
    C: FnMut() -> CFut,
    CFut: Future<Output = Result<S, RedisError>>,
    S: Stream<Item = Result<String, GatewayError>>,
    H: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let messages = match open().await {
            Ok(messages) => messages,
            Err(e) => {
                if classify(&e) == FaultKind::Fatal {
                    error!(error = %e, %channel, "Redis subscription failed");
                    return Err(GatewayError::Broadcast(e.to_string()));
                }
                warn!(error = %e, %channel, "Redis unreachable, retrying subscription");
                tokio::time::sleep(backoff).await;
                continue;
            }
        };
        info!(%channel, "Subscribed to Redis channel");

        match pump(messages, &handler).await {
            SubscriptionEnd::Disconnected => {
                warn!(%channel, "Redis connection lost, resubscribing");
                tokio::time::sleep(backoff).await;
            }
            SubscriptionEnd::Failed(e) => {
                error!(error = %e, %channel, "Redis subscription terminated");
                return Err(e);
            }
        }
    }
}

/// Decodes a pub/sub payload, replacing invalid UTF-8 sequences.
fn payload_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            warn!(error = %e, bytes = bytes.len(), "non-UTF-8 broadcast payload");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[async_trait]
impl BroadcastPublisher for RedisBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| GatewayError::Broadcast(format!("publish to {channel} failed: {e}")))?;
        debug!(channel, receivers, "Published to Redis channel");
        Ok(())
    }
}
