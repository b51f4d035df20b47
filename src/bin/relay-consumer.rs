//! relay-consumer entry point.
//!
//! Joins the Kafka consumer group, runs each message through the user
//! business logic, and publishes the results on the Redis broadcast
//! channel.

use std::sync::Arc;

use anyhow::Context;

use relay_gateway::broadcast::{BroadcastPublisher, RedisBus};
use relay_gateway::config::GatewayConfig;
use relay_gateway::eventlog::admin::ensure_topics;
use relay_gateway::eventlog::{KafkaLogConsumer, KafkaSettings, LogSource};
use relay_gateway::persistence::PostgresUserRepository;
use relay_gateway::service::{Dispatcher, UserOperations, UserService, run_receive_loop};
use relay_gateway::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config =
        GatewayConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    telemetry::init(config.log_format);
    tracing::info!(
        brokers = %config.kafka_brokers,
        group_id = %config.kafka_group_id,
        "starting relay-consumer"
    );

    let repository = PostgresUserRepository::connect(&config)
        .await
        .context("connecting to PostgreSQL")?;
    repository
        .ensure_schema()
        .await
        .context("creating users table")?;
    let users: Arc<dyn UserOperations> = Arc::new(UserService::new(repository));

    let publisher: Arc<dyn BroadcastPublisher> = Arc::new(
        RedisBus::connect(&config.redis_url)
            .await
            .context("connecting to Redis")?,
    );

    let settings = KafkaSettings::from_config(&config);
    if let Err(e) = ensure_topics(&settings).await {
        tracing::warn!(error = %e, "topic provisioning failed; relying on existing topics");
    }

    let mut consumer = KafkaLogConsumer::new(settings);
    consumer
        .connect()
        .await
        .context("could not connect to Kafka")?;
    let read_backoff = consumer.read_backoff();
    let consumer = Arc::new(consumer);

    let dispatcher = Dispatcher::new(users, publisher, config.broadcast_channel.clone());
    let receive_loop = tokio::spawn(run_receive_loop(
        Arc::clone(&consumer) as Arc<dyn LogSource>,
        dispatcher,
        read_backoff,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested");

    receive_loop.abort();
    let _ = receive_loop.await;

    match Arc::try_unwrap(consumer) {
        Ok(mut consumer) => {
            if let Err(e) = consumer.close() {
                tracing::warn!(error = %e, "Kafka consumer did not close cleanly");
            }
        }
        Err(_) => tracing::warn!("Kafka consumer still shared at shutdown; dropping"),
    }
    tracing::info!("relay-consumer stopped");
    Ok(())
}
