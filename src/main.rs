//! relay-gateway server entry point.
//!
//! Serves the REST API and the `/ws` endpoint, forwards client envelopes
//! to Kafka, and relays the Redis broadcast channel to every local
//! WebSocket session.

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Context;

use relay_gateway::api;
use relay_gateway::app_state::AppState;
use relay_gateway::broadcast::RedisBus;
use relay_gateway::config::GatewayConfig;
use relay_gateway::domain::SessionRegistry;
use relay_gateway::eventlog::{EventProducer, KafkaProducer, KafkaSettings};
use relay_gateway::persistence::PostgresUserRepository;
use relay_gateway::service::{UserOperations, UserService};
use relay_gateway::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config =
        GatewayConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    telemetry::init(config.log_format);
    tracing::info!(addr = %config.listen_addr, "starting relay-gateway");

    // Storage and business logic
    let repository = PostgresUserRepository::connect(&config)
        .await
        .context("connecting to PostgreSQL")?;
    repository
        .ensure_schema()
        .await
        .context("creating users table")?;
    let users: Arc<dyn UserOperations> = Arc::new(UserService::new(repository));

    // Pipeline clients
    let producer = Arc::new(
        KafkaProducer::new(&KafkaSettings::from_config(&config))
            .context("creating Kafka producer")?,
    );
    let bus = RedisBus::connect(&config.redis_url)
        .await
        .context("connecting to Redis")?;

    // Broadcast channel → local sessions
    let sessions = Arc::new(SessionRegistry::new());
    let fanout = Arc::clone(&sessions);
    let mut subscription = bus.subscribe(&config.broadcast_channel, move |payload: String| {
        let sessions = Arc::clone(&fanout);
        async move {
            sessions.broadcast(&payload).await;
        }
    });

    // Build router
    let app = api::build_app(AppState {
        users,
        sessions,
        producer: Arc::clone(&producer) as Arc<dyn EventProducer>,
        session_write_timeout: config.session_write_timeout(),
    });

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    let result = tokio::select! {
        served = server.into_future() => served.context("HTTP server failed"),
        ended = &mut subscription => match ended {
            Ok(Ok(())) => Err(anyhow::anyhow!("broadcast subscription ended")),
            Ok(Err(e)) => Err(e).context("broadcast subscription failed"),
            Err(e) => Err(e).context("broadcast subscription task aborted"),
        },
    };

    subscription.abort();
    if let Err(e) = producer.close().await {
        tracing::warn!(error = %e, "Kafka producer did not close cleanly");
    }
    tracing::info!("relay-gateway stopped");
    result
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
