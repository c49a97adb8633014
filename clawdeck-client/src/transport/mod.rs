//! Duplex text transport.
//!
//! A [`Connector`] opens a connection and hands back a [`Transport`]: an
//! outbound queue and a stream of [`TransportEvent`]s. Nothing here knows
//! about frames; the connection layer above decodes text and owns all
//! protocol state, so any transport that moves text messages will do.

pub mod memory;
mod websocket;

pub use websocket::WebSocketConnector;

use crate::error::ClientError;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

/// Message queued for the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Close the connection gracefully.
    Close,
}

/// Signal raised by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text message.
    Message(String),
    /// The remote side closed the connection.
    Closed,
    /// The connection failed.
    Error(String),
}

/// An open connection.
#[derive(Debug)]
pub struct Transport {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Transport {
    pub fn new(
        outbound: mpsc::UnboundedSender<Outbound>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Splits the transport into its writer and reader halves.
    pub fn split(
        self,
    ) -> (
        mpsc::UnboundedSender<Outbound>,
        mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        (self.outbound, self.inbound)
    }
}

/// Opens transports.
///
/// A failed open is reported once, through the returned future.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str) -> BoxFuture<'static, Result<Transport, ClientError>>;
}
