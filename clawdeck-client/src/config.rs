//! Client configuration.

use crate::reconnect::ReconnectPolicy;
use clawdeck_protocol::{AuthCredentials, ClientInfo, ConnectParams, DeviceIdentity, PROTOCOL_VERSION};
use std::time::Duration;

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout of the out-of-band health probe.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    /// Credentials sent in the handshake and as the health probe bearer.
    pub auth: AuthCredentials,
    /// Timeout for opening the socket.
    pub connect_timeout: Duration,
    /// Timeout for each request, the handshake included.
    pub request_timeout: Duration,
    /// Timeout for the HTTP health probe.
    pub health_timeout: Duration,
    /// Reconnection backoff.
    pub reconnect: ReconnectPolicy,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    pub min_protocol: u32,
    pub max_protocol: u32,
    /// Client descriptor sent in the handshake.
    pub client: ClientInfo,
    pub role: Option<String>,
    pub scopes: Vec<String>,
    pub caps: Vec<String>,
    /// Device identity proof, forwarded verbatim if set.
    pub device: Option<DeviceIdentity>,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth: AuthCredentials::default(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            client: ClientInfo::new("cli", env!("CARGO_PKG_VERSION"))
                .with_platform(std::env::consts::OS)
                .with_mode("cli"),
            role: Some("operator".to_string()),
            scopes: vec!["operator.read".to_string(), "operator.write".to_string()],
            caps: Vec::new(),
            device: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth.token = Some(token.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.auth.password = Some(password.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn with_protocol_range(mut self, min: u32, max: u32) -> Self {
        self.min_protocol = min;
        self.max_protocol = max;
        self
    }

    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_caps(mut self, caps: Vec<String>) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_device(mut self, device: DeviceIdentity) -> Self {
        self.device = Some(device);
        self
    }

    /// Returns the bearer token, if one is configured.
    pub fn token(&self) -> Option<&str> {
        self.auth.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Builds the params of the `connect` handshake request.
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            min_protocol: self.min_protocol,
            max_protocol: self.max_protocol,
            client: self.client.clone(),
            role: self.role.clone(),
            scopes: Some(self.scopes.clone()),
            caps: Some(self.caps.clone()),
            auth: Some(self.auth.clone()),
            device: self.device.clone(),
        }
    }
}
