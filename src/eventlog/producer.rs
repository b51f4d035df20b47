//! Kafka producer with a per-topic sender cache.
//!
//! Topics are derived from client envelopes, so they cannot be declared at
//! startup. A [`TopicSender`] is cached only once the broker has
//! acknowledged an append to its topic, and the cache holds at most
//! [`MAX_CACHED_SENDERS`] entries; sends past that limit use a throwaway
//! sender. [`KafkaProducer::close`] flushes outstanding deliveries and
//! drops the cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::KafkaSettings;
use crate::error::GatewayError;

/// Upper bound on cached topic senders.
pub const MAX_CACHED_SENDERS: usize = 1024;

/// Append side of the durable log.
#[async_trait]
pub trait EventProducer: Send + Sync + fmt::Debug {
    /// Appends `value` to `topic` under `key`.
    ///
    /// Resolves only after the broker acknowledges the append or the
    /// deadline passes. Never retries.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::LogSend`] if the broker rejects the message
    /// and [`GatewayError::LogTimeout`] if no acknowledgement arrives in time.
    async fn send(&self, topic: &str, key: &str, value: &[u8]) -> Result<(), GatewayError>;
}

/// Sender bound to one topic.
pub struct TopicSender {
    topic: String,
    producer: FutureProducer,
    sent: AtomicU64,
}

impl fmt::Debug for TopicSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicSender")
            .field("topic", &self.topic)
            .field("sent", &self.sent.load(Ordering::Relaxed))
            .finish()
    }
}

impl TopicSender {
    fn new(topic: &str, producer: FutureProducer) -> Self {
        Self {
            topic: topic.to_string(),
            producer,
            sent: AtomicU64::new(0),
        }
    }

    /// Topic this sender writes to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Number of acknowledged appends through this sender.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    async fn send(&self, key: &str, value: &[u8], deadline: Duration) -> Result<(), GatewayError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(value);
        let delivery = self.producer.send(record, Timeout::After(deadline));

        match tokio::time::timeout(deadline, delivery).await {
            Err(_) => Err(GatewayError::LogTimeout {
                topic: self.topic.clone(),
            }),
            Ok(Err((e, _))) => Err(GatewayError::LogSend {
                topic: self.topic.clone(),
                reason: e.to_string(),
            }),
            Ok(Ok(_)) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }
}

/// Kafka-backed [`EventProducer`].
pub struct KafkaProducer {
    producer: FutureProducer,
    senders: RwLock<HashMap<String, Arc<TopicSender>>>,
    cache_limit: usize,
    send_timeout: Duration,
    bootstrap_servers: String,
}

impl fmt::Debug for KafkaProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaProducer")
            .field("bootstrap_servers", &self.bootstrap_servers)
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

impl KafkaProducer {
    /// Creates the producer client. No broker connection is made until the
    /// first send.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::LogConnection`] if the client configuration
    /// is rejected.
    pub fn new(settings: &KafkaSettings) -> Result<Self, GatewayError> {
        let producer: FutureProducer = settings.producer_config().create().map_err(|e| {
            GatewayError::LogConnection(format!("failed to create Kafka producer: {e}"))
        })?;

        info!(
            bootstrap_servers = %settings.bootstrap_servers,
            "Kafka producer initialized"
        );

        Ok(Self {
            producer,
            senders: RwLock::new(HashMap::new()),
            cache_limit: MAX_CACHED_SENDERS,
            send_timeout: settings.send_timeout,
            bootstrap_servers: settings.bootstrap_servers.clone(),
        })
    }

    /// Returns the cached sender for `topic`, or a new uncached one.
    pub async fn sender_for(&self, topic: &str) -> Arc<TopicSender> {
        if let Some(sender) = self.senders.read().await.get(topic) {
            return Arc::clone(sender);
        }
        Arc::new(TopicSender::new(topic, self.producer.clone()))
    }

    /// Caches `sender` unless its topic is already cached or the cache is
    /// full.
    async fn remember(&self, sender: &Arc<TopicSender>) {
        let mut map = self.senders.write().await;
        if map.contains_key(sender.topic()) {
            return;
        }
        if map.len() >= self.cache_limit {
            debug!(topic = sender.topic(), "sender cache full, not caching");
            return;
        }
        debug!(topic = sender.topic(), "caching topic sender");
        map.insert(sender.topic().to_string(), Arc::clone(sender));
    }

    /// Topics that currently have a cached sender.
    pub async fn cached_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.senders.read().await.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Flushes outstanding deliveries and drops every cached sender.
    /// Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::LogSend`] if the flush does not complete
    /// within the send timeout.
    pub async fn close(&self) -> Result<(), GatewayError> {
        let dropped = {
            let mut map = self.senders.write().await;
            let count = map.len();
            map.clear();
            count
        };

        let producer = self.producer.clone();
        let deadline = self.send_timeout;
        let flushed = tokio::task::spawn_blocking(move || producer.flush(Timeout::After(deadline)))
            .await
            .map_err(|e| GatewayError::Internal(format!("flush task failed: {e}")))?;

        match flushed {
            Ok(()) => {
                info!(senders = dropped, "Kafka producer closed");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to flush Kafka producer");
                Err(GatewayError::LogSend {
                    topic: "*".to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl EventProducer for KafkaProducer {
    async fn send(&self, topic: &str, key: &str, value: &[u8]) -> Result<(), GatewayError> {
        let sender = self.sender_for(topic).await;
        match sender.send(key, value, self.send_timeout).await {
            Ok(()) => {
                self.remember(&sender).await;
                debug!(topic, key, bytes = value.len(), "Kafka message sent");
                Ok(())
            }
            Err(e) => {
                error!(topic, error = %e, "error producing Kafka message");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn unreachable_settings() -> KafkaSettings {
        KafkaSettings::new("127.0.0.1:1", "test-group")
            .with_send_timeout(Duration::from_millis(300))
    }

    fn producer() -> KafkaProducer {
        let Ok(producer) = KafkaProducer::new(&unreachable_settings()) else {
            panic!("client config accepted");
        };
        producer
    }

    #[tokio::test]
    async fn remembered_senders_are_reused_per_topic() {
        let producer = producer();

        let fresh = producer.sender_for("user.created").await;
        assert!(producer.cached_topics().await.is_empty());
        assert!(!Arc::ptr_eq(&fresh, &producer.sender_for("user.created").await));

        producer.remember(&fresh).await;
        let c = producer.sender_for("user.fetch").await;
        producer.remember(&c).await;

        assert!(Arc::ptr_eq(&fresh, &producer.sender_for("user.created").await));
        assert_eq!(c.topic(), "user.fetch");
        assert_eq!(
            producer.cached_topics().await,
            vec!["user.created".to_string(), "user.fetch".to_string()]
        );
    }

    #[tokio::test]
    async fn cache_stops_growing_at_its_limit() {
        let mut producer = producer();
        producer.cache_limit = 2;

        for topic in ["a.one", "a.two", "a.three"] {
            let sender = producer.sender_for(topic).await;
            producer.remember(&sender).await;
        }

        assert_eq!(
            producer.cached_topics().await,
            vec!["a.one".to_string(), "a.two".to_string()]
        );
    }

    #[tokio::test]
    async fn close_tears_down_cache_and_is_idempotent() {
        let producer = producer();
        let sender = producer.sender_for("user.read").await;
        producer.remember(&sender).await;
        assert_eq!(producer.cached_topics().await.len(), 1);

        assert!(producer.close().await.is_ok());
        assert!(producer.cached_topics().await.is_empty());
        assert!(producer.close().await.is_ok());
    }

    #[tokio::test]
    async fn failed_send_leaves_cache_unchanged() {
        let producer = producer();

        let started = tokio::time::Instant::now();
        let result = producer
            .send("user.created", "user", br#"{"event":"user","type":"created"}"#)
            .await;

        assert!(matches!(
            result,
            Err(GatewayError::LogTimeout { .. } | GatewayError::LogSend { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(producer.cached_topics().await.is_empty());
    }
}
