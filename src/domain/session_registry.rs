//! Registry of live WebSocket sessions with self-healing fan-out.
//!
//! [`SessionRegistry`] owns the write half of every connected socket,
//! keyed by [`SessionId`]. Registration and the broadcast snapshot are
//! serialized by one mutex; the socket writes themselves happen after the
//! lock is released, so a slow client never blocks (un)registration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::Mutex;

use super::SessionId;
use crate::error::GatewayError;

/// Write side of one session.
///
/// Implemented by the WebSocket sink in [`crate::ws`] and by test fakes.
#[async_trait]
pub trait SessionSink: Send + Sync + fmt::Debug {
    /// Writes one text frame to the client.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionWrite`] if the socket is closed or
    /// the write does not complete in time.
    async fn send_text(&self, payload: &str) -> Result<(), GatewayError>;
}

/// Outcome of one [`SessionRegistry::broadcast`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions that received the payload.
    pub delivered: usize,
    /// Sessions removed because their write failed.
    pub evicted: Vec<SessionId>,
}

/// Central store for all live sessions.
///
/// Constructed once per gateway process and shared by `Arc` with the
/// WebSocket handler and the broadcast subscription.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<dyn SessionSink>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session. Registering an id that is already present keeps the
    /// existing sink and returns `false`.
    pub async fn register(&self, id: SessionId, sink: Arc<dyn SessionSink>) -> bool {
        let mut map = self.sessions.lock().await;
        if map.contains_key(&id) {
            return false;
        }
        map.insert(id, sink);
        tracing::info!(session = %id, live = map.len(), "session registered");
        true
    }

    /// Removes a session. Returns `false` if it was not registered.
    pub async fn unregister(&self, id: SessionId) -> bool {
        let mut map = self.sessions.lock().await;
        let removed = map.remove(&id).is_some();
        if removed {
            tracing::info!(session = %id, live = map.len(), "session unregistered");
        }
        removed
    }

    /// Writes `payload` to every live session.
    ///
    /// The session set is copied under the lock; writes run concurrently
    /// outside it. A session whose write fails is unregistered and the
    /// remaining sessions are unaffected.
    pub async fn broadcast(&self, payload: &str) -> BroadcastReport {
        let snapshot: Vec<(SessionId, Arc<dyn SessionSink>)> = {
            let map = self.sessions.lock().await;
            map.iter().map(|(id, sink)| (*id, Arc::clone(sink))).collect()
        };

        let writes = snapshot.into_iter().map(|(id, sink)| async move {
            let result = sink.send_text(payload).await;
            (id, result)
        });
        let results = join_all(writes).await;

        let mut report = BroadcastReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(session = %id, error = %e, "evicting session after failed write");
                    report.evicted.push(id);
                }
            }
        }

        if !report.evicted.is_empty() {
            let mut map = self.sessions.lock().await;
            for id in &report.evicted {
                map.remove(id);
            }
        }

        tracing::debug!(
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "broadcast complete"
        );
        report
    }

    /// Returns `true` if the session is registered.
    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().await.contains_key(&id)
    }

    /// Returns the number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns `true` if no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Records every frame; can be switched to fail.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub(crate) frames: std::sync::Mutex<Vec<String>>,
        pub(crate) broken: AtomicBool,
    }

    impl RecordingSink {
        pub(crate) fn broken() -> Self {
            let sink = Self::default();
            sink.broken.store(true, Ordering::SeqCst);
            sink
        }

        pub(crate) fn frames(&self) -> Vec<String> {
            self.frames
                .lock()
                .map(|f| f.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl SessionSink for RecordingSink {
        async fn send_text(&self, payload: &str) -> Result<(), GatewayError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(GatewayError::SessionWrite("connection reset".to_string()));
            }
            if let Ok(mut frames) = self.frames.lock() {
                frames.push(payload.to_string());
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct SlowSink;

    #[async_trait]
    impl SessionSink for SlowSink {
        async fn send_text(&self, _payload: &str) -> Result<(), GatewayError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        assert!(registry.register(id, Arc::new(RecordingSink::default())).await);
        assert!(!registry.register(id, Arc::new(RecordingSink::default())).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unregister_twice_is_noop() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.register(id, Arc::new(RecordingSink::default())).await;
        assert!(registry.unregister(id).await);
        assert!(!registry.unregister(id).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_session() {
        let registry = SessionRegistry::new();
        let sinks: Vec<Arc<RecordingSink>> =
            (0..5).map(|_| Arc::new(RecordingSink::default())).collect();
        for sink in &sinks {
            let sink: Arc<dyn SessionSink> = Arc::clone(sink) as Arc<dyn SessionSink>;
            registry.register(SessionId::new(), sink).await;
        }

        let report = registry.broadcast(r#"{"id":1}"#).await;
        assert_eq!(report.delivered, 5);
        assert!(report.evicted.is_empty());
        for sink in &sinks {
            assert_eq!(sink.frames(), vec![r#"{"id":1}"#.to_string()]);
        }
    }

    #[tokio::test]
    async fn failed_write_evicts_only_that_session() {
        let registry = SessionRegistry::new();
        let healthy = Arc::new(RecordingSink::default());
        let healthy_id = SessionId::new();
        let broken_id = SessionId::new();
        registry
            .register(healthy_id, Arc::clone(&healthy) as Arc<dyn SessionSink>)
            .await;
        registry
            .register(broken_id, Arc::new(RecordingSink::broken()))
            .await;

        let first = registry.broadcast("one").await;
        assert_eq!(first.delivered, 1);
        assert_eq!(first.evicted, vec![broken_id]);
        assert!(!registry.contains(broken_id).await);
        assert!(registry.contains(healthy_id).await);

        let second = registry.broadcast("two").await;
        assert_eq!(second.delivered, 1);
        assert!(second.evicted.is_empty());
        assert_eq!(healthy.frames(), vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn slow_session_does_not_block_registration() {
        let registry = Arc::new(SessionRegistry::new());
        registry.register(SessionId::new(), Arc::new(SlowSink)).await;

        let fanout = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.broadcast("payload").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = tokio::time::Instant::now();
        registry
            .register(SessionId::new(), Arc::new(RecordingSink::default()))
            .await;
        assert!(started.elapsed() < Duration::from_millis(150));

        let Ok(report) = fanout.await else {
            panic!("broadcast task panicked");
        };
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn broadcast_on_empty_registry_is_noop() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.broadcast("x").await, BroadcastReport::default());
    }
}
