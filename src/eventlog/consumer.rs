//! Kafka consumer-group member.
//!
//! Lifecycle:
//!
//! ```text
//! Disconnected ─connect()─▶ Connecting ─▶ Subscribed ─close()─▶ Closing ─▶ Closed
//!                              │
//!                              └─ retry budget spent ─▶ Disconnected (error returned)
//! ```
//!
//! While `Subscribed`, the receive loop in [`crate::service::dispatcher`]
//! alternates between polling ([`LogSource::next_message`]) and handling,
//! committing each offset with [`LogSource::commit`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Message, Offset, TopicPartitionList};
use tracing::{info, warn};

use super::{KafkaSettings, LogMessage, connect_with_retry};
use crate::error::GatewayError;

/// Timeout for the broker metadata request made on each connection attempt.
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// No client exists.
    Disconnected,
    /// Startup retry in progress.
    Connecting,
    /// Joined the group and subscribed to the topic set.
    Subscribed,
    /// Releasing the client.
    Closing,
    /// Client released; no further reads.
    Closed,
}

/// Read side of the durable log, as seen by the receive loop.
#[async_trait]
pub trait LogSource: Send + Sync + fmt::Debug {
    /// Blocks until the next message is available.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::LogRead`] on a transient read failure.
    async fn next_message(&self) -> Result<LogMessage, GatewayError>;

    /// Marks `message` as consumed for the group.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::LogCommit`] if the offset cannot be stored.
    async fn commit(&self, message: &LogMessage) -> Result<(), GatewayError>;
}

/// Kafka-backed [`LogSource`].
pub struct KafkaLogConsumer {
    settings: KafkaSettings,
    consumer: Option<Arc<StreamConsumer>>,
    state: ConsumerState,
}

impl fmt::Debug for KafkaLogConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaLogConsumer")
            .field("bootstrap_servers", &self.settings.bootstrap_servers)
            .field("group_id", &self.settings.group_id)
            .field("topics", &self.settings.topics)
            .field("state", &self.state)
            .finish()
    }
}

impl KafkaLogConsumer {
    /// Creates a consumer in the `Disconnected` state. No client is built
    /// until [`KafkaLogConsumer::connect`].
    #[must_use]
    pub fn new(settings: KafkaSettings) -> Self {
        Self {
            settings,
            consumer: None,
            state: ConsumerState::Disconnected,
        }
    }

    /// Connects to the brokers, joins the group, and subscribes.
    ///
    /// Each attempt fetches broker metadata; up to
    /// `settings.connect_attempts` attempts are made with
    /// `settings.connect_backoff` between them.
    ///
    /// # Errors
    ///
    /// Returns the last connection error once the retry budget is spent.
    pub async fn connect(&mut self) -> Result<(), GatewayError> {
        if self.state == ConsumerState::Subscribed {
            return Ok(());
        }
        self.state = ConsumerState::Connecting;

        let settings = &self.settings;
        let result = connect_with_retry(
            settings.connect_attempts,
            settings.connect_backoff,
            |_| open_consumer(settings),
        )
        .await;

        match result {
            Ok(consumer) => {
                self.consumer = Some(consumer);
                self.state = ConsumerState::Subscribed;
                info!(
                    group_id = %self.settings.group_id,
                    topics = ?self.settings.topics,
                    "Kafka consumer subscribed"
                );
                Ok(())
            }
            Err(e) => {
                self.state = ConsumerState::Disconnected;
                Err(e)
            }
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConsumerState {
        self.state
    }

    /// Pause the receive loop applies after a failed read.
    #[must_use]
    pub const fn read_backoff(&self) -> Duration {
        self.settings.read_backoff
    }

    /// Releases the underlying client.
    ///
    /// Idempotent, and a no-op on a consumer that never connected.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` keeps the shutdown path uniform
    /// with the producer.
    pub fn close(&mut self) -> Result<(), GatewayError> {
        if let Some(consumer) = self.consumer.take() {
            self.state = ConsumerState::Closing;
            consumer.unsubscribe();
            drop(consumer);
            info!(group_id = %self.settings.group_id, "Kafka consumer closed");
        }
        self.state = ConsumerState::Closed;
        Ok(())
    }

    fn client(&self) -> Result<&StreamConsumer, GatewayError> {
        self.consumer
            .as_deref()
            .ok_or_else(|| GatewayError::LogRead("consumer is not connected".to_string()))
    }
}

#[async_trait]
impl LogSource for KafkaLogConsumer {
    async fn next_message(&self) -> Result<LogMessage, GatewayError> {
        let consumer = self.client()?;
        let msg = consumer
            .recv()
            .await
            .map_err(|e| GatewayError::LogRead(e.to_string()))?;

        Ok(LogMessage {
            topic: msg.topic().to_string(),
            key: msg.key().map(<[u8]>::to_vec),
            value: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: msg.partition(),
            offset: msg.offset(),
        })
    }

    async fn commit(&self, message: &LogMessage) -> Result<(), GatewayError> {
        let consumer = self
            .consumer
            .as_deref()
            .ok_or_else(|| GatewayError::LogCommit("consumer is not connected".to_string()))?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset.saturating_add(1)),
        )
        .map_err(|e| GatewayError::LogCommit(e.to_string()))?;

        consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| GatewayError::LogCommit(e.to_string()))
    }
}

/// Builds a consumer, checks the brokers are reachable, and subscribes to the topic set.
async fn open_consumer(settings: &KafkaSettings) -> Result<Arc<StreamConsumer>, GatewayError> {
    let consumer: StreamConsumer = settings.consumer_config().create().map_err(|e| {
        GatewayError::LogConnection(format!("failed to create Kafka consumer: {e}"))
    })?;
    let consumer = Arc::new(consumer);

    let client = Arc::clone(&consumer);
    tokio::task::spawn_blocking(move || client.fetch_metadata(None, METADATA_TIMEOUT).map(|_| ()))
        .await
        .map_err(|e| GatewayError::Internal(format!("metadata task failed: {e}")))?
        .map_err(|e| GatewayError::LogConnection(format!("brokers unreachable: {e}")))?;

    if settings.topics.is_empty() {
        warn!("Kafka consumer has no topics configured");
    }
    let topics: Vec<&str> = settings.topics.iter().map(String::as_str).collect();
    consumer
        .subscribe(&topics)
        .map_err(|e| GatewayError::LogConnection(format!("failed to subscribe: {e}")))?;

    Ok(consumer)
}
