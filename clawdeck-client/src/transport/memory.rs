//! In-memory transport for tests and benchmarks.
//!
//! [`MemoryConnector::new`] returns the connector together with a
//! [`MemoryServer`]; every successful open hands the server a
//! [`MemoryPeer`] that plays the gateway side of that connection.

use super::{Connector, Outbound, Transport, TransportEvent};
use crate::error::ClientError;
use clawdeck_protocol::{Decoder, Encoder, Frame, RequestFrame};
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug)]
struct Shared {
    refuse: AtomicUsize,
    opens: AtomicUsize,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Connector whose connections terminate in a [`MemoryServer`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryServer) {
        let (peers, accept) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            refuse: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            peers,
        });
        (
            Self {
                shared: shared.clone(),
            },
            MemoryServer { shared, accept },
        )
    }
}

impl Connector for MemoryConnector {
    fn open(&self, url: &str) -> BoxFuture<'static, Result<Transport, ClientError>> {
        let shared = self.shared.clone();
        let url = url.to_string();
        Box::pin(async move {
            shared.opens.fetch_add(1, Ordering::SeqCst);

            let refused = shared
                .refuse
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(ClientError::Transport(format!("connection refused: {}", url)));
            }

            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let peer = MemoryPeer {
                url,
                inbound: out_rx,
                outbound: in_tx,
            };
            shared
                .peers
                .send(peer)
                .map_err(|_| ClientError::Transport("memory server dropped".to_string()))?;

            Ok(Transport::new(out_tx, in_rx))
        })
    }
}

/// Accepting side of a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryServer {
    shared: Arc<Shared>,
    accept: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Waits for the next connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept.recv().await
    }

    /// Returns a connection that was already opened, without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept.try_recv().ok()
    }

    /// Makes the next `n` opens fail.
    pub fn refuse_next(&self, n: usize) {
        self.shared.refuse.store(n, Ordering::SeqCst);
    }

    /// Number of open attempts so far, refused ones included.
    pub fn open_attempts(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }
}

/// Gateway side of one in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    inbound: mpsc::UnboundedReceiver<Outbound>,
    outbound: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryPeer {
    /// URL the client opened.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends raw text to the client.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.outbound
            .send(TransportEvent::Message(text.into()))
            .is_ok()
    }

    /// Encodes and sends a frame to the client.
    pub fn send_frame(&self, frame: impl Into<Frame>) -> bool {
        match Encoder::encode(&frame.into()) {
            Ok(text) => self.send_text(text),
            Err(_) => false,
        }
    }

    /// Receives the next text message, or `None` once the client closed
    /// or dropped the connection.
    pub async fn recv_text(&mut self) -> Option<String> {
        match self.inbound.recv().await {
            Some(Outbound::Text(text)) => Some(text),
            Some(Outbound::Close) | None => None,
        }
    }

    /// Receives the next request frame, skipping anything else.
    pub async fn recv_request(&mut self) -> Option<RequestFrame> {
        loop {
            let text = self.recv_text().await?;
            if let Ok(Frame::Request(request)) = Decoder::decode(&text) {
                return Some(request);
            }
        }
    }

    /// Closes the connection from the gateway side.
    pub fn close(&self) {
        let _ = self.outbound.send(TransportEvent::Closed);
    }

    /// Fails the connection with a transport error.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.outbound.send(TransportEvent::Error(reason.into()));
    }

    /// Returns true if the client dropped its end of the connection.
    pub fn is_client_gone(&self) -> bool {
        self.outbound.is_closed()
    }
}
