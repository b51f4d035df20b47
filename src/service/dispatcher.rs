//! Event dispatcher: log message → business logic → broadcast.
//!
//! The receive loop is the consumer process's only reader of the log. It
//! never terminates on its own: read failures back off and retry, handler
//! failures are logged, and every consumed offset is committed whether or
//! not its handler succeeded (at-most-once).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::broadcast::BroadcastPublisher;
use crate::domain::{UserEvent, UserTopic};
use crate::error::GatewayError;
use crate::eventlog::{LogMessage, LogSource};
use crate::service::UserOperations;

/// What happened to one consumed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Business logic succeeded and the result was published.
    Published,
    /// Business logic succeeded but the broadcast publish failed.
    PublishFailed,
    /// The topic has no handler.
    UnknownTopic,
    /// The value failed to decode or validate.
    Rejected,
    /// The business-logic call failed.
    Failed,
}

/// Maps log messages to user operations and publishes their results.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    users: Arc<dyn UserOperations>,
    publisher: Arc<dyn BroadcastPublisher>,
    channel: String,
}

impl Dispatcher {
    /// Creates a dispatcher publishing on `channel`.
    pub fn new(
        users: Arc<dyn UserOperations>,
        publisher: Arc<dyn BroadcastPublisher>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            users,
            publisher,
            channel: channel.into(),
        }
    }

    /// Broadcast channel results are published on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Handles one message. Never fails; the outcome says what happened.
    pub async fn dispatch(&self, message: &LogMessage) -> DispatchOutcome {
        let Ok(topic) = message.topic.parse::<UserTopic>() else {
            warn!(topic = %message.topic, "Unknown topic");
            return DispatchOutcome::UnknownTopic;
        };

        let event = match UserEvent::decode(topic, &message.value) {
            Ok(event) => event,
            Err(e) => {
                error!(%topic, offset = message.offset, error = %e, "Failed to decode event");
                return DispatchOutcome::Rejected;
            }
        };

        let payload = match self.execute(event).await {
            Ok(payload) => payload,
            Err(e) => {
                error!(%topic, offset = message.offset, error = %e, "Business logic failed");
                return DispatchOutcome::Failed;
            }
        };

        match self.publisher.publish(&self.channel, &payload).await {
            Ok(()) => {
                debug!(%topic, channel = %self.channel, "Result broadcast");
                DispatchOutcome::Published
            }
            Err(e) => {
                error!(%topic, channel = %self.channel, error = %e, "Failed to publish result");
                DispatchOutcome::PublishFailed
            }
        }
    }

    /// Runs the business-logic call for `event` and serializes its result.
    async fn execute(&self, event: UserEvent) -> Result<String, GatewayError> {
        let value = match event {
            UserEvent::Created {
                first_name,
                last_name,
            } => {
                let user = self.users.create_user(&first_name, &last_name).await?;
                info!(user_id = user.id, "User created from event");
                serde_json::to_string(&user)
            }
            UserEvent::FetchById { user_id } => {
                let user = self.users.fetch_user_by_id(user_id).await?;
                serde_json::to_string(&user)
            }
            UserEvent::ReadAll => {
                let users = self.users.list_users().await?;
                serde_json::to_string(&users)
            }
        };
        value.map_err(|e| GatewayError::Internal(format!("failed to serialize result: {e}")))
    }
}

/// Reads, dispatches, and commits one message.
///
/// The offset is committed after the handler returns regardless of its
/// outcome. A commit failure is logged and does not fail the call.
///
/// # Errors
///
/// Returns the read error when no message could be obtained; the caller
/// backs off before polling again.
pub async fn poll_once(
    source: &dyn LogSource,
    dispatcher: &Dispatcher,
) -> Result<DispatchOutcome, GatewayError> {
    let message = source.next_message().await?;
    debug!(
        topic = %message.topic,
        partition = message.partition,
        offset = message.offset,
        "Message received"
    );

    let outcome = dispatcher.dispatch(&message).await;

    if let Err(e) = source.commit(&message).await {
        error!(topic = %message.topic, offset = message.offset, error = %e, "Failed to commit offset");
    }
    Ok(outcome)
}

/// Receive loop. Never returns; run it on its own task and abort the task
/// to stop.
pub async fn run_receive_loop(
    source: Arc<dyn LogSource>,
    dispatcher: Dispatcher,
    read_backoff: Duration,
) {
    info!(channel = %dispatcher.channel(), "Receive loop started");
    loop {
        if let Err(e) = poll_once(source.as_ref(), &dispatcher).await {
            error!(error = %e, backoff_secs = read_backoff.as_secs(), "Error reading message");
            tokio::time::sleep(read_backoff).await;
        }
    }
}
