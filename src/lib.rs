//! # relay-gateway
//!
//! WebSocket event relay. Client writes are appended to a durable log
//! (Kafka), handled by a consumer-group dispatcher that runs the user
//! business logic, and every result is fanned out over a broadcast bus
//! (Redis pub/sub) to the WebSocket sessions of every gateway instance.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)                         Clients (HTTP)
//!     │                                           │
//!     ├── WS read loop (ws/)                      ├── REST Handlers (api/)
//!     │     └── EventProducer ──▶ Kafka topic     │     └── UserOperations
//!     │                               │           │
//!     │                 KafkaLogConsumer (eventlog/)
//!     │                               │
//!     │                 Dispatcher (service/) ──▶ UserService ──▶ PostgreSQL
//!     │                               │
//!     │                 BroadcastPublisher ──▶ Redis channel
//!     │                                               │
//!     └── SessionRegistry (domain/) ◀── RedisBus::subscribe (broadcast/)
//! ```
//!
//! Two binaries wire these pieces: `relay-gateway` (HTTP, WebSocket,
//! producer, subscription) and `relay-consumer` (consumer, dispatcher,
//! publisher).

pub mod api;
pub mod app_state;
pub mod broadcast;
pub mod config;
pub mod domain;
pub mod error;
pub mod eventlog;
pub mod persistence;
pub mod service;
pub mod telemetry;
pub mod ws;
