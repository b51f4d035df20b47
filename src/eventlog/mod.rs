//! Durable event log (Kafka).
//!
//! - [`producer`]: appends client envelopes to topics derived at runtime.
//! - [`consumer`]: consumer-group member with bounded startup retry.
//! - [`admin`]: provisions the consumer's fixed topic set.
//!
//! Topic naming: `"<event>.<type>"`, computed from each envelope.
//! Message key: the envelope's `event` field.

pub mod admin;
pub mod consumer;
pub mod producer;

use std::time::Duration;

use rdkafka::ClientConfig;

use crate::config::GatewayConfig;
use crate::error::GatewayError;

pub use consumer::{ConsumerState, KafkaLogConsumer, LogSource};
pub use producer::{EventProducer, KafkaProducer};

/// Deadline for one produce call, including the broker acknowledgement.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Startup connection attempts before the consumer gives up.
pub const CONNECT_ATTEMPTS: u32 = 5;

/// Pause between startup connection attempts.
pub const CONNECT_BACKOFF: Duration = Duration::from_secs(10);

/// Pause after a failed read before polling again.
pub const READ_BACKOFF: Duration = Duration::from_secs(10);

/// A message consumed from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// Topic the message was read from.
    pub topic: String,
    /// Message key, if any.
    pub key: Option<Vec<u8>>,
    /// Raw value (the client envelope).
    pub value: Vec<u8>,
    /// Partition the message was read from.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
}

/// Kafka connection settings shared by producer, consumer, and admin client.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Consumer group ID.
    pub group_id: String,
    /// Topics the consumer subscribes to.
    pub topics: Vec<String>,
    /// Produce deadline.
    pub send_timeout: Duration,
    /// Startup connection attempts.
    pub connect_attempts: u32,
    /// Pause between connection attempts.
    pub connect_backoff: Duration,
    /// Pause after a failed read.
    pub read_backoff: Duration,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// SASL username.
    pub sasl_username: Option<String>,
    /// SASL password.
    pub sasl_password: Option<String>,
}

impl KafkaSettings {
    /// Settings with the default timeouts and retry budget.
    pub fn new(bootstrap_servers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            group_id: group_id.into(),
            topics: Vec::new(),
            send_timeout: SEND_TIMEOUT,
            connect_attempts: CONNECT_ATTEMPTS,
            connect_backoff: CONNECT_BACKOFF,
            read_backoff: READ_BACKOFF,
            security_protocol: None,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
        }
    }

    /// Builds settings from the process configuration.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut settings = Self::new(&config.kafka_brokers, &config.kafka_group_id)
            .with_topics(config.kafka_topics.clone());
        settings.security_protocol = config.kafka_security_protocol.clone();
        settings.sasl_mechanism = config.kafka_sasl_mechanism.clone();
        settings.sasl_username = config.kafka_sasl_username.clone();
        settings.sasl_password = config.kafka_sasl_password.clone();
        settings
    }

    /// Sets the subscribed topics.
    #[must_use]
    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    /// Overrides the startup retry budget.
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.connect_attempts = attempts;
        self.connect_backoff = backoff;
        self
    }

    /// Overrides the produce deadline.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Client config for producers: every append waits for all replicas.
    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("message.timeout.ms", self.send_timeout.as_millis().to_string());
        config.set("acks", "all");
        self.apply_security_config(&mut config);
        config
    }

    /// Client config for the consumer group. Offsets are committed
    /// manually after each handled message.
    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("group.id", &self.group_id);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");
        config.set("fetch.min.bytes", "10000");
        config.set("fetch.max.bytes", "10000000");
        config.set("fetch.wait.max.ms", "1000");
        self.apply_security_config(&mut config);
        config
    }

    /// Client config for the admin client.
    fn admin_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        self.apply_security_config(&mut config);
        config
    }

    fn apply_security_config(&self, config: &mut ClientConfig) {
        if let Some(ref protocol) = self.security_protocol {
            config.set("security.protocol", protocol);
        }
        if let Some(ref mechanism) = self.sasl_mechanism {
            config.set("sasl.mechanism", mechanism);
        }
        if let Some(ref username) = self.sasl_username {
            config.set("sasl.username", username);
        }
        if let Some(ref password) = self.sasl_password {
            config.set("sasl.password", password);
        }
    }
}

/// Retries `connect` up to `attempts` times, sleeping `backoff` between
/// failures. Returns the last error once the budget is spent.
///
/// # Errors
///
/// Returns the error of the final attempt, or
/// [`GatewayError::LogConnection`] when `attempts` is zero.
pub async fn connect_with_retry<T, F, Fut>(
    attempts: u32,
    backoff: Duration,
    mut connect: F,
) -> Result<T, GatewayError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, GatewayError>>,
{
    let mut last_err = GatewayError::LogConnection("no connection attempts configured".to_string());
    for attempt in 1..=attempts {
        match connect(attempt).await {
            Ok(value) => {
                tracing::info!(attempt, "connected to Kafka");
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(attempt, max = attempts, error = %e, "Kafka connection attempt failed");
                last_err = e;
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    tracing::error!(attempts, "maximum retry attempts reached, could not connect to Kafka");
    Err(last_err)
}
