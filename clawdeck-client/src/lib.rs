//! # clawdeck-client
//!
//! Client library for the agent Gateway.
//!
//! This crate provides:
//! - One WebSocket carrying concurrent RPC calls, matched to responses by id
//! - Event dispatch with per-name and wildcard (`*`) handlers
//! - Handshake and connection status tracking
//! - Automatic reconnection with exponential backoff
//! - A typed API over the gateway's method catalogue, plus an HTTP health probe
//! - An in-memory transport for tests

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod reconnect;
pub mod session;
pub mod stats;
pub mod transport;

pub use client::{Client, DEFAULT_TRIGGER_MESSAGE};
pub use config::ClientConfig;
pub use connection::Connection;
pub use dispatcher::{EventHandler, Subscription};
pub use error::ClientError;
pub use reconnect::ReconnectPolicy;
pub use session::{ConnectionStatus, StatusUpdate};
pub use stats::StatsSnapshot;
