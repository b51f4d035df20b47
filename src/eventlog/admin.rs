//! Topic provisioning for the consumer's fixed topic set.

use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::types::RDKafkaErrorCode;
use tracing::{debug, info};

use super::KafkaSettings;
use crate::error::GatewayError;

/// Broker-side timeout for the create request.
const CREATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates every topic in `settings.topics` with one partition and a
/// replication factor of one. Topics that already exist are left alone.
///
/// # Errors
///
/// Returns [`GatewayError::LogConnection`] if the admin client cannot be
/// created or the request fails, and for any per-topic error other than
/// "already exists".
pub async fn ensure_topics(settings: &KafkaSettings) -> Result<(), GatewayError> {
    if settings.topics.is_empty() {
        return Ok(());
    }

    let admin: AdminClient<DefaultClientContext> =
        settings.admin_config().create().map_err(|e| {
            GatewayError::LogConnection(format!("failed to create Kafka admin client: {e}"))
        })?;

    let new_topics: Vec<NewTopic<'_>> = settings
        .topics
        .iter()
        .map(|t| NewTopic::new(t, 1, TopicReplication::Fixed(1)))
        .collect();
    let options = AdminOptions::new().operation_timeout(Some(CREATE_TIMEOUT));

    let results = admin
        .create_topics(&new_topics, &options)
        .await
        .map_err(|e| GatewayError::LogConnection(format!("topic creation failed: {e}")))?;

    for result in results {
        match result {
            Ok(topic) => info!(%topic, "Kafka topic created"),
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                debug!(%topic, "Kafka topic already exists");
            }
            Err((topic, code)) => {
                return Err(GatewayError::LogConnection(format!(
                    "failed to create topic {topic}: {code}"
                )));
            }
        }
    }
    Ok(())
}
