//! Monitor configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via CLAWDECK_CONFIG or --config)
//! 3. Environment variables

use clawdeck_client::{ClientConfig, ReconnectPolicy};
use clawdeck_protocol::ClientInfo;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default gateway URL.
pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:18789";

/// Monitor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gateway endpoint and credentials.
    pub gateway: GatewayConfig,
    /// Handshake parameters and timeouts.
    pub session: SessionConfig,
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
    /// Polling intervals.
    pub polling: PollingConfig,
    /// Activity and log buffers.
    pub feed: FeedConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CLAWDECK_CONFIG").ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Like [`Config::load`], with the file path given explicitly.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.gateway.apply_env_overrides();
        self.reconnect.apply_env_overrides();
        self.polling.apply_env_overrides();
        self.metrics.apply_env_overrides();
    }

    /// Loads the gateway token from `token_file` if configured.
    pub fn load_secrets(&mut self) -> Result<(), ConfigError> {
        self.gateway.load_secrets()
    }

    /// Checks values that would make the monitor misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.validate()?;

        if self.session.min_protocol > self.session.max_protocol {
            return Err(ConfigError::ValidationError(format!(
                "min_protocol {} exceeds max_protocol {}",
                self.session.min_protocol, self.session.max_protocol
            )));
        }
        if self.session.request_timeout_secs == 0 || self.session.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session timeouts must be non-zero".to_string(),
            ));
        }
        if self.polling.refresh_interval_secs == 0
            || self.polling.health_interval_secs == 0
            || self.polling.health_timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "polling intervals must be non-zero".to_string(),
            ));
        }
        if self.feed.activity_capacity == 0 || self.feed.log_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "feed capacities must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Builds the client configuration.
    pub fn client_config(&self) -> ClientConfig {
        let session = &self.session;
        let mut client = ClientConfig::new(&self.gateway.url)
            .with_connect_timeout(session.connect_timeout())
            .with_request_timeout(session.request_timeout())
            .with_health_timeout(self.polling.health_timeout())
            .with_reconnect(self.reconnect.policy())
            .with_protocol_range(session.min_protocol, session.max_protocol)
            .with_client(
                ClientInfo::new(&session.client_id, &session.client_version)
                    .with_platform(std::env::consts::OS)
                    .with_mode(&session.client_mode),
            )
            .with_role(&session.role)
            .with_scopes(session.scopes.clone())
            .with_caps(session.caps.clone());

        if let Some(token) = self.gateway.token.as_deref().filter(|t| !t.is_empty()) {
            client = client.with_token(token);
        }
        if let Some(password) = self.gateway.password.as_deref().filter(|p| !p.is_empty()) {
            client = client.with_password(password);
        }
        client
    }
}

/// Gateway endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// WebSocket URL of the gateway.
    pub url: String,
    /// Bearer token.
    pub token: Option<String>,
    /// Password, for gateways configured with password auth.
    pub password: Option<String>,
    /// File holding the token (first non-comment line).
    pub token_file: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token: None,
            password: None,
            token_file: None,
        }
    }
}

impl GatewayConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CLAWDECK_GATEWAY_URL") {
            self.url = url;
        }
        if let Ok(token) = std::env::var("CLAWDECK_GATEWAY_TOKEN") {
            self.token = Some(token);
        }
        if let Ok(password) = std::env::var("CLAWDECK_GATEWAY_PASSWORD") {
            self.password = Some(password);
        }
        if let Ok(path) = std::env::var("CLAWDECK_GATEWAY_TOKEN_FILE") {
            self.token_file = Some(PathBuf::from(path));
        }
    }

    /// Reads the token from `token_file`, if set. Blank lines and lines
    /// starting with `#` are skipped.
    pub fn load_secrets(&mut self) -> Result<(), ConfigError> {
        if let Some(ref path) = self.token_file {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.clone(), e))?;
            let token = content
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty() && !line.starts_with('#'));
            match token {
                Some(token) => self.token = Some(token.to_string()),
                None => {
                    return Err(ConfigError::ValidationError(format!(
                        "token file '{}' contains no token",
                        path.display()
                    )))
                }
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| ConfigError::ValidationError(format!("invalid gateway url: {}", e)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(ConfigError::ValidationError(format!(
                "gateway url must use ws:// or wss://, got {}://",
                other
            ))),
        }
    }
}

/// Handshake parameters and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client_id: String,
    pub client_version: String,
    pub client_mode: String,
    pub role: String,
    pub scopes: Vec<String>,
    pub caps: Vec<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Socket open timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_protocol: clawdeck_protocol::PROTOCOL_VERSION,
            max_protocol: clawdeck_protocol::PROTOCOL_VERSION,
            client_id: "cli".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            client_mode: "cli".to_string(),
            role: "operator".to_string(),
            scopes: vec!["operator.read".to_string(), "operator.write".to_string()],
            caps: Vec::new(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Reconnection backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("CLAWDECK_RECONNECT_MAX_ATTEMPTS") {
            if let Ok(n) = max.parse() {
                self.max_attempts = n;
            }
        }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// Polling intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Full refresh interval in seconds.
    pub refresh_interval_secs: u64,
    /// Health probe interval in seconds.
    pub health_interval_secs: u64,
    /// Health probe timeout in seconds.
    pub health_timeout_secs: u64,
    /// `limit` passed to `logs.tail` on refresh.
    pub log_tail_limit: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 15,
            health_interval_secs: 30,
            health_timeout_secs: 5,
            log_tail_limit: 200,
        }
    }
}

impl PollingConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(interval) = std::env::var("CLAWDECK_REFRESH_INTERVAL") {
            if let Ok(secs) = interval.parse() {
                self.refresh_interval_secs = secs;
            }
        }
        if let Ok(interval) = std::env::var("CLAWDECK_HEALTH_INTERVAL") {
            if let Ok(secs) = interval.parse() {
                self.health_interval_secs = secs;
            }
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

/// Activity feed and log buffer sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub activity_capacity: usize,
    pub log_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            activity_capacity: 200,
            log_capacity: 200,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics HTTP server.
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics server to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 9464)),
        }
    }
}

impl MetricsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("CLAWDECK_METRICS_ENABLED") {
            self.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }
        if let Ok(addr) = std::env::var("CLAWDECK_METRICS_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.session.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.polling.refresh_interval(), Duration::from_secs(15));
        assert_eq!(config.polling.health_interval(), Duration::from_secs(30));
        assert_eq!(config.metrics.bind_addr.port(), 9464);
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.gateway.url = "wss://gw.example.com".to_string();
        config.reconnect.max_attempts = 3;
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.gateway.url, "wss://gw.example.com");
        assert_eq!(parsed.reconnect.max_attempts, 3);
        assert_eq!(parsed.metrics.bind_addr, config.metrics.bind_addr);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: Config = serde_yaml::from_str("gateway:\n  token: abc\n").unwrap();
        assert_eq!(parsed.gateway.token.as_deref(), Some("abc"));
        assert_eq!(parsed.gateway.url, DEFAULT_GATEWAY_URL);
        assert_eq!(parsed.feed.activity_capacity, 200);
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.gateway.url = "http://gw".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.min_protocol = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.polling.refresh_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.feed.log_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# gateway token").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  secret-token  ").unwrap();

        let mut config = Config::default();
        config.gateway.token_file = Some(file.path().to_path_buf());
        config.load_secrets().unwrap();
        assert_eq!(config.gateway.token.as_deref(), Some("secret-token"));
    }

    #[test]
    fn test_empty_token_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.gateway.token_file = Some(file.path().to_path_buf());
        assert!(config.load_secrets().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clawdeck.yaml");
        let mut config = Config::default();
        config.polling.log_tail_limit = 50;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.polling.log_tail_limit, 50);
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(matches!(
            Config::load_from(Some(&missing)),
            Err(ConfigError::IoError(path, _)) if path == missing
        ));
    }

    #[test]
    fn test_client_config() {
        let mut config = Config::default();
        config.gateway.token = Some("tok".to_string());
        config.reconnect.max_attempts = 2;
        let client = config.client_config();
        assert_eq!(client.url, DEFAULT_GATEWAY_URL);
        assert_eq!(client.token(), Some("tok"));
        assert_eq!(client.reconnect.max_attempts, 2);
        assert_eq!(client.client.id, "cli");
    }
}
