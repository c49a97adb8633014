//! # clawdeck-protocol
//!
//! Wire protocol for the agent Gateway control plane.
//!
//! This crate provides:
//! - The three frame kinds (request, response, event) and their JSON encoding
//! - Text codec with a typed decode error for each way a frame can be malformed
//! - Handshake parameter and hello payload types
//! - The RPC method catalogue, mapping each method name to its params and result
//! - Domain models returned by the Gateway (agents, sessions, cron jobs, ...)

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod method;
pub mod types;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use frame::{ErrorShape, EventFrame, Frame, RequestFrame, ResponseFrame};
pub use message::{AuthCredentials, ClientInfo, ConnectParams, DeviceIdentity, HelloAuth, HelloOk};
pub use method::Method;

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: u32 = 3;

/// Name of the handshake method.
pub const CONNECT_METHOD: &str = "connect";

/// Event name that subscribes a handler to every event.
pub const WILDCARD_EVENT: &str = "*";
