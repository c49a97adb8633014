//! Connection management.
//!
//! A [`Connection`] owns at most one transport at a time. Each transport is
//! tagged with a generation number; a reader task whose generation is no
//! longer current ignores everything it receives, so a socket that was torn
//! down cannot touch the state of its successor.

use crate::config::ClientConfig;
use crate::correlator::Correlator;
use crate::dispatcher::{Dispatcher, Subscription};
use crate::error::ClientError;
use crate::reconnect::Backoff;
use crate::session::{validate_hello, ConnectionStatus, StatusCell, StatusUpdate};
use crate::stats::{ClientStats, StatsSnapshot};
use crate::transport::{Connector, Outbound, Transport, TransportEvent, WebSocketConnector};
use clawdeck_protocol::{
    Decoder, Encoder, EventFrame, Frame, HelloOk, RequestFrame, CONNECT_METHOD,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    User,
    Reconnect,
}

/// The live transport, if any.
#[derive(Default)]
struct Link {
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    reader: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct SessionState {
    hello: Option<HelloOk>,
    device_token: Option<String>,
}

struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    correlator: Correlator,
    dispatcher: Dispatcher,
    status: StatusCell,
    link: Mutex<Link>,
    backoff: Mutex<Backoff>,
    session: Mutex<SessionState>,
    /// Orders the end of a handshake against the loss of its transport.
    transition: Mutex<()>,
    stats: Arc<ClientStats>,
}

/// A connection to a gateway.
///
/// Cloning is cheap; clones share the same underlying connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Creates a new connection over WebSocket (not yet connected).
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(WebSocketConnector))
    }

    /// Creates a new connection over a custom transport.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let stats = Arc::new(ClientStats::default());
        Self {
            inner: Arc::new(Inner {
                correlator: Correlator::new(stats.clone()),
                dispatcher: Dispatcher::new(config.event_capacity, stats.clone()),
                status: StatusCell::new(),
                link: Mutex::new(Link::default()),
                backoff: Mutex::new(Backoff::default()),
                session: Mutex::new(SessionState::default()),
                transition: Mutex::new(()),
                config,
                connector,
                stats,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Opens the socket and performs the handshake.
    ///
    /// Any existing connection is torn down first. Resolves with the hello
    /// payload once the status is [`ConnectionStatus::Connected`]; on
    /// failure the status is [`ConnectionStatus::Error`].
    pub async fn connect(&self) -> Result<HelloOk, ClientError> {
        Inner::establish(&self.inner, Origin::User).await
    }

    /// Closes the connection, cancels reconnection and rejects every pending
    /// request with [`ClientError::ConnectionClosed`].
    pub fn disconnect(&self) {
        tracing::debug!("Disconnecting...");
        self.inner.backoff.lock().cancel(&self.inner.config.reconnect);
        self.inner.teardown(&ClientError::ConnectionClosed);
        {
            let mut session = self.inner.session.lock();
            session.hello = None;
        }
        self.inner.status.set(ConnectionStatus::Disconnected, None);
    }

    /// Sends a request and waits for its payload.
    ///
    /// Fails immediately with [`ClientError::NotConnected`] if no socket is
    /// open.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        self.inner.request(method, params).await
    }

    /// Registers an event handler. Use `*` to receive every event.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&EventFrame) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(event, handler)
    }

    /// Registers a status handler.
    pub fn on_status<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&StatusUpdate) + Send + Sync + 'static,
    {
        self.inner.status.on(handler)
    }

    /// Subscribes to every event (for watch commands).
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventFrame> {
        self.inner.dispatcher.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.get()
    }

    pub fn status_watch(&self) -> watch::Receiver<StatusUpdate> {
        self.inner.status.watch()
    }

    /// Returns whether the handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Device token issued by the last successful handshake.
    pub fn device_token(&self) -> Option<String> {
        self.inner.session.lock().device_token.clone()
    }

    /// Hello payload of the current connection.
    pub fn hello(&self) -> Option<HelloOk> {
        self.inner.session.lock().hello.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Returns the number of pending requests.
    pub fn pending_count(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    /// Reconnect attempts used since the last successful handshake.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.backoff.lock().attempts()
    }
}

impl Inner {
    async fn establish(self: &Arc<Self>, origin: Origin) -> Result<HelloOk, ClientError> {
        if origin == Origin::User {
            self.backoff.lock().restart();
        }

        self.teardown(&ClientError::ConnectionClosed);
        let generation = {
            let mut link = self.link.lock();
            link.generation += 1;
            link.generation
        };
        self.status.set(ConnectionStatus::Connecting, None);
        tracing::debug!("Connecting to {} (generation {})...", self.config.url, generation);

        let opened = tokio::time::timeout(
            self.config.connect_timeout,
            self.connector.open(&self.config.url),
        )
        .await;
        let transport = match opened {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => return Err(self.fail(generation, origin, e)),
            Err(_) => {
                let e = ClientError::Transport(format!(
                    "connect to {} timed out after {:?}",
                    self.config.url, self.config.connect_timeout
                ));
                return Err(self.fail(generation, origin, e));
            }
        };

        if !self.install(generation, transport) {
            tracing::debug!("Connection generation {} superseded", generation);
            return Err(ClientError::ConnectionClosed);
        }

        tracing::debug!("Starting protocol handshake...");
        let params = self.config.connect_params();
        let payload = match serde_json::to_value(&params) {
            Ok(value) => self.request(CONNECT_METHOD, Some(value)).await,
            Err(e) => Err(ClientError::from(e)),
        };
        let hello = match payload.and_then(|payload| validate_hello(&params, payload)) {
            Ok(hello) => hello,
            Err(e) => return Err(self.fail(generation, origin, e)),
        };

        let transition = self.transition.lock();
        let live = {
            let link = self.link.lock();
            if link.generation != generation {
                return Err(ClientError::ConnectionClosed);
            }
            link.outbound.is_some()
        };
        if !live {
            drop(transition);
            tracing::debug!("Transport closed before the handshake completed");
            return Err(self.fail(generation, origin, ClientError::ConnectionClosed));
        }
        {
            let mut session = self.session.lock();
            session.device_token = hello.device_token().map(str::to_string);
            session.hello = Some(hello.clone());
        }
        self.backoff.lock().reset();
        self.status.set(ConnectionStatus::Connected, None);
        drop(transition);
        tracing::debug!("Handshake complete, protocol {}", hello.protocol);

        Ok(hello)
    }

    /// Records a failed connect attempt of `generation`.
    fn fail(self: &Arc<Self>, generation: u64, origin: Origin, error: ClientError) -> ClientError {
        tracing::debug!("Connect failed: {}", error);
        if self.link.lock().generation != generation {
            return error;
        }

        self.teardown(&error);
        self.status.set(ConnectionStatus::Error, Some(error.to_string()));
        if origin == Origin::Reconnect {
            self.schedule_reconnect();
        }
        error
    }

    /// Installs a freshly opened transport and starts its reader.
    fn install(self: &Arc<Self>, generation: u64, transport: Transport) -> bool {
        let (outbound, inbound) = transport.split();
        let mut link = self.link.lock();
        if link.generation != generation {
            let _ = outbound.send(Outbound::Close);
            return false;
        }

        let weak = Arc::downgrade(self);
        link.outbound = Some(outbound);
        link.reader = Some(tokio::spawn(read_loop(weak, generation, inbound)));
        true
    }

    /// Drops the current transport, if any, and rejects pending requests.
    fn teardown(&self, error: &ClientError) {
        let (outbound, reader) = {
            let mut link = self.link.lock();
            link.generation += 1;
            (link.outbound.take(), link.reader.take())
        };

        if let Some(outbound) = outbound {
            tracing::debug!("Closing transport");
            let _ = outbound.send(Outbound::Close);
        }
        if let Some(reader) = reader {
            reader.abort();
        }

        let rejected = self.correlator.reject_all(error);
        if rejected > 0 {
            tracing::debug!("Rejected {} pending requests", rejected);
        }
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let id = self.correlator.next_id();
        let outbound = self.link.lock().outbound.clone();
        let outbound = match outbound {
            Some(tx) if !tx.is_closed() => tx,
            _ => {
                tracing::debug!("request() id={} called but not connected", id);
                return Err(ClientError::NotConnected);
            }
        };

        let request = RequestFrame {
            id: id.clone(),
            method: method.to_string(),
            params,
        };
        let encoded = Encoder::encode_request(&request)?;

        let call = self.correlator.register(&id, method);
        if outbound.send(Outbound::Text(encoded)).is_err() {
            call.cancel();
            return Err(ClientError::NotConnected);
        }
        self.stats.request_sent();
        tracing::debug!("Request id={} method={} sent", id, method);

        call.wait(self.config.request_timeout).await
    }

    fn handle_text(&self, text: &str) {
        match Decoder::decode(text) {
            Ok(Frame::Response(response)) => {
                self.correlator.resolve(response);
            }
            Ok(Frame::Event(event)) => {
                self.dispatcher.dispatch(&event);
            }
            Ok(Frame::Request(request)) => {
                self.stats.frame_dropped();
                tracing::debug!("Dropping unexpected request frame method={}", request.method);
            }
            Err(e) => {
                self.stats.frame_dropped();
                tracing::debug!("Dropping malformed frame: {}", e);
            }
        }
    }

    /// The transport of `generation` closed (`error` is `None`) or failed.
    fn transport_lost(self: &Arc<Self>, generation: u64, error: Option<String>) {
        let _transition = self.transition.lock();
        {
            let mut link = self.link.lock();
            if link.generation != generation || link.outbound.is_none() {
                return;
            }
            link.outbound = None;
            // This task is the reader; let it finish on its own.
            link.reader = None;
        }

        let reason = match &error {
            Some(e) => ClientError::Transport(e.clone()),
            None => ClientError::ConnectionClosed,
        };
        self.correlator.reject_all(&reason);

        let was = self.status.get();
        tracing::debug!("Transport lost while {}: {}", was, reason);
        if was != ConnectionStatus::Connected {
            // A handshake in flight fails on its own, either through its
            // rejected request or by finding the transport gone.
            return;
        }

        self.session.lock().hello = None;
        match error {
            None => self.status.set(ConnectionStatus::Disconnected, None),
            Some(e) => self.status.set(ConnectionStatus::Error, Some(e)),
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let mut backoff = self.backoff.lock();
        let Some((delay, epoch)) = backoff.next(&self.config.reconnect) else {
            tracing::debug!("Reconnect attempts exhausted");
            return;
        };

        self.stats.reconnect_attempted();
        tracing::info!(
            "Reconnecting in {:?} (attempt {}/{})",
            delay,
            backoff.attempts(),
            self.config.reconnect.max_attempts
        );

        let weak = Arc::downgrade(self);
        backoff.arm(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.backoff.lock().is_current(epoch) {
                return;
            }
            if let Err(e) = Inner::establish(&inner, Origin::Reconnect).await {
                tracing::debug!("Reconnect attempt failed: {}", e);
            }
        }));
    }
}

async fn read_loop(
    weak: Weak<Inner>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
) {
    tracing::debug!("read_loop started (generation {})", generation);
    while let Some(event) = inbound.recv().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if inner.link.lock().generation != generation {
            tracing::debug!("read_loop: generation {} is stale", generation);
            return;
        }

        match event {
            TransportEvent::Message(text) => inner.handle_text(&text),
            TransportEvent::Closed => {
                inner.transport_lost(generation, None);
                return;
            }
            TransportEvent::Error(e) => {
                inner.transport_lost(generation, Some(e));
                return;
            }
        }
    }

    tracing::debug!("read_loop: transport ended");
    if let Some(inner) = weak.upgrade() {
        inner.transport_lost(generation, None);
    }
}
