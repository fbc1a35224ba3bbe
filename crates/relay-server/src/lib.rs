//! # relay-server
//!
//! HTTP + WebSocket harness that lets end-to-end tests observe and inject
//! pointer and draw events on live client connections.
//!
//! - WebSocket gateway on `/ws`: connection registry, heartbeat, frame routing
//! - Per-connection last-event caches with one-shot waiters
//! - Six fixed harness endpoints plus `/health`
//! - Shutdown that releases waiters and drops every socket

pub mod cache;
pub mod config;
pub mod connection;
pub mod handlers;
pub mod server;
pub mod socket;

pub use config::{ConfigError, ServerConfig};
pub use server::{build_router, start, AppState, ServerHandle};
