//! WebSocket connection lifecycle.
//!
//! The write half is wrapped in a [`WsSession`] and handed to the session
//! registry; the read half stays here and drives the inbound loop until
//! the client goes away.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use crate::domain::{Envelope, SessionId, SessionRegistry, SessionSink};
use crate::error::GatewayError;
use crate::eventlog::EventProducer;

/// Write half of one client socket.
pub struct WsSession {
    id: SessionId,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    write_timeout: Duration,
}

impl fmt::Debug for WsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsSession")
            .field("id", &self.id)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

impl WsSession {
    fn new(id: SessionId, sink: SplitSink<WebSocket, Message>, write_timeout: Duration) -> Self {
        Self {
            id,
            sink: Mutex::new(sink),
            write_timeout,
        }
    }
}

#[async_trait]
impl SessionSink for WsSession {
    async fn send_text(&self, payload: &str) -> Result<(), GatewayError> {
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(self.write_timeout, sink.send(Message::text(payload))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GatewayError::SessionWrite(e.to_string())),
            Err(_) => Err(GatewayError::SessionWrite(format!(
                "write timed out after {:?}",
                self.write_timeout
            ))),
        }
    }
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Appended to the given topic.
    Forwarded(String),
    /// Not a valid envelope; dropped.
    Malformed,
    /// The log did not accept the append for the given topic; dropped.
    SendFailed(String),
}

/// Validates one text frame and appends it verbatim to its topic, keyed
/// by the envelope's `event`. At most one send per frame, never retried.
pub async fn handle_inbound(producer: &dyn EventProducer, frame: &str) -> InboundOutcome {
    let envelope = match Envelope::parse(frame) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed frame");
            return InboundOutcome::Malformed;
        }
    };

    let topic = envelope.topic();
    match producer.send(&topic, &envelope.event, frame.as_bytes()).await {
        Ok(()) => {
            tracing::debug!(%topic, "frame forwarded to log");
            InboundOutcome::Forwarded(topic)
        }
        Err(e) => {
            tracing::error!(%topic, error = %e, "failed to forward frame");
            InboundOutcome::SendFailed(topic)
        }
    }
}

/// Runs one connection: registers the session, forwards inbound frames
/// until the client disconnects, then unregisters.
pub async fn run_connection(
    socket: WebSocket,
    sessions: Arc<SessionRegistry>,
    producer: Arc<dyn EventProducer>,
    write_timeout: Duration,
) {
    let id = SessionId::new();
    let (ws_tx, mut ws_rx) = socket.split();
    sessions
        .register(id, Arc::new(WsSession::new(id, ws_tx, write_timeout)))
        .await;

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_inbound(producer.as_ref(), text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(session = %id, error = %e, "ws read failed");
                break;
            }
        }
    }

    sessions.unregister(id).await;
    tracing::debug!(session = %id, "ws connection closed");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio_tungstenite::tungstenite;

    use crate::app_state::AppState;
    use crate::service::UserOperations;
    use crate::service::dispatcher::tests::FakeUsers;

    /// Records every send; can be switched to fail.
    #[derive(Debug, Default)]
    struct RecordingProducer {
        sent: std::sync::Mutex<Vec<(String, String, Vec<u8>)>>,
        failing: AtomicBool,
    }

    impl RecordingProducer {
        fn sent(&self) -> Vec<(String, String, Vec<u8>)> {
            let Ok(s) = self.sent.lock() else {
                panic!("poisoned");
            };
            s.clone()
        }
    }

    #[async_trait]
    impl EventProducer for RecordingProducer {
        async fn send(&self, topic: &str, key: &str, value: &[u8]) -> Result<(), GatewayError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(GatewayError::LogTimeout {
                    topic: topic.to_string(),
                });
            }
            let Ok(mut s) = self.sent.lock() else {
                panic!("poisoned");
            };
            s.push((topic.to_string(), key.to_string(), value.to_vec()));
            Ok(())
        }
    }

    const ADA: &str =
        r#"{"type":"created","event":"user","data":{"first_name":"Ada","last_name":"Lovelace"}}"#;

    #[tokio::test]
    async fn valid_frame_is_forwarded_verbatim() {
        let producer = RecordingProducer::default();
        let outcome = handle_inbound(&producer, ADA).await;

        assert_eq!(outcome, InboundOutcome::Forwarded("user.created".to_string()));
        assert_eq!(
            producer.sent(),
            vec![(
                "user.created".to_string(),
                "user".to_string(),
                ADA.as_bytes().to_vec()
            )]
        );
    }

    #[tokio::test]
    async fn malformed_frame_is_never_sent() {
        let producer = RecordingProducer::default();
        assert_eq!(handle_inbound(&producer, "not json").await, InboundOutcome::Malformed);
        assert_eq!(
            handle_inbound(&producer, r#"{"event":"","type":"created"}"#).await,
            InboundOutcome::Malformed
        );
        assert!(producer.sent().is_empty());
    }

    #[tokio::test]
    async fn illegal_topic_name_is_never_sent() {
        let producer = RecordingProducer::default();
        assert_eq!(
            handle_inbound(&producer, r#"{"event":"user","type":"created/../x"}"#).await,
            InboundOutcome::Malformed
        );
        assert!(producer.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_reported_once() {
        let producer = RecordingProducer::default();
        producer.failing.store(true, Ordering::SeqCst);
        let outcome = handle_inbound(&producer, ADA).await;
        assert_eq!(outcome, InboundOutcome::SendFailed("user.created".to_string()));
    }

    async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn socket_round_trip_through_registry() {
        let sessions = Arc::new(SessionRegistry::new());
        let producer = Arc::new(RecordingProducer::default());
        let state = AppState {
            users: Arc::new(FakeUsers::default()) as Arc<dyn UserOperations>,
            sessions: Arc::clone(&sessions),
            producer: Arc::clone(&producer) as Arc<dyn EventProducer>,
            session_write_timeout: Duration::from_secs(1),
        };
        let app = crate::api::build_app(state);

        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind ephemeral port");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("local addr");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let Ok((mut client, _)) =
            tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await
        else {
            panic!("ws handshake");
        };

        let Ok(()) = client.send(tungstenite::Message::text(ADA)).await else {
            panic!("client send");
        };
        assert!(wait_until(|| !producer.sent().is_empty()).await);
        let Some((topic, key, value)) = producer.sent().into_iter().next() else {
            panic!("frame forwarded");
        };
        assert_eq!(topic, "user.created");
        assert_eq!(key, "user");
        assert_eq!(value, ADA.as_bytes());

        let payload =
            r#"{"id":1,"first_name":"Ada","last_name":"Lovelace","created_at":"2024-01-01 00:00:00"}"#;
        let report = sessions.broadcast(payload).await;
        assert_eq!(report.delivered, 1);

        let Some(Ok(received)) = client.next().await else {
            panic!("broadcast frame");
        };
        let Ok(text) = received.to_text() else {
            panic!("text frame");
        };
        assert_eq!(text, payload);

        let _ = client.close(None).await;
        for _ in 0..200 {
            if sessions.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(sessions.is_empty().await);
    }
}
