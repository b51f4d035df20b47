//! Service layer: business logic and log-driven dispatch.
//!
//! [`UserService`] validates and persists users. [`Dispatcher`] maps
//! consumed log messages onto [`UserOperations`] and republishes each
//! result on the broadcast bus.

pub mod dispatcher;
pub mod user_service;

pub use dispatcher::{DispatchOutcome, Dispatcher, poll_once, run_receive_loop};
pub use user_service::{UserOperations, UserService};
