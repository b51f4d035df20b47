//! WebSocket layer: upgrade handling and per-connection read loop.
//!
//! Each connection registers its write half in the
//! [`crate::domain::SessionRegistry`] and forwards every inbound envelope
//! to the durable log. Nothing is written back in response; clients only
//! receive broadcast results.

pub mod connection;
pub mod handler;
