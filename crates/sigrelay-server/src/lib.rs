//! # sigrelay-server
//!
//! Axum HTTP + `WebSocket` signaling relay.
//!
//! - `WebSocket` gateway at `/ws`: per-connection reader/writer tasks, heartbeat
//! - Single relay actor owning the connection registry
//! - Role registration (`host` / `client`) and opposite-role forwarding
//! - Client-count and request-offer notifications to hosts
//! - `/health`, `/metrics`, optional static file serving
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod health;
pub mod lifecycle;
pub mod metrics;
pub mod notify;
pub mod registry;
pub mod relay;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::{ConfigError, RelayConfig};
pub use relay::{Relay, RelayEvent, RelayHandle};
pub use server::{start, ServerHandle};
