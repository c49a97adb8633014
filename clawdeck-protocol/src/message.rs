//! Handshake message types.

use serde::{Deserialize, Serialize};

/// Client descriptor sent during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl ClientInfo {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            platform: None,
            mode: None,
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }
}

/// Credentials presented to the gateway. The gateway decides which one it
/// accepts.
#[derive(Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuthCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl AuthCredentials {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            password: None,
        }
    }

    pub fn password(password: impl Into<String>) -> Self {
        Self {
            token: None,
            password: Some(password.into()),
        }
    }

    /// Returns true if neither a token nor a password is set.
    pub fn is_empty(&self) -> bool {
        self.token.as_deref().map_or(true, str::is_empty)
            && self.password.as_deref().map_or(true, str::is_empty)
    }
}

impl std::fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Device identity proof, forwarded verbatim when the caller supplies one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub id: String,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Parameters of the `connect` handshake request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceIdentity>,
}

impl ConnectParams {
    /// Returns true if `protocol` lies inside the requested range.
    pub fn accepts(&self, protocol: u32) -> bool {
        (self.min_protocol..=self.max_protocol).contains(&protocol)
    }
}

/// Auth section of the hello payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloAuth {
    pub device_token: String,
}

/// Successful handshake payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    /// Negotiated protocol version.
    pub protocol: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<HelloAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_interval_ms: Option<u64>,
}

impl HelloOk {
    /// Returns the rotated device token, if the gateway issued one.
    pub fn device_token(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.device_token.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> ConnectParams {
        ConnectParams {
            min_protocol: 3,
            max_protocol: 3,
            client: ClientInfo::new("cli", "1.0.0")
                .with_platform("linux")
                .with_mode("cli"),
            role: Some("operator".to_string()),
            scopes: Some(vec!["operator.read".into(), "operator.write".into()]),
            caps: Some(vec![]),
            auth: Some(AuthCredentials::token("tok")),
            device: None,
        }
    }

    #[test]
    fn test_connect_params_wire_shape() {
        let value = serde_json::to_value(params()).unwrap();
        assert_eq!(
            value,
            json!({
                "minProtocol": 3,
                "maxProtocol": 3,
                "client": {"id": "cli", "version": "1.0.0", "platform": "linux", "mode": "cli"},
                "role": "operator",
                "scopes": ["operator.read", "operator.write"],
                "caps": [],
                "auth": {"token": "tok"}
            })
        );
    }

    #[test]
    fn test_protocol_range() {
        let mut p = params();
        p.min_protocol = 2;
        assert!(p.accepts(2));
        assert!(p.accepts(3));
        assert!(!p.accepts(1));
        assert!(!p.accepts(4));
    }

    #[test]
    fn test_hello_ok_parsing() {
        let hello: HelloOk = serde_json::from_value(json!({
            "protocol": 3,
            "auth": {"deviceToken": "dev-abc"},
            "tickIntervalMs": 15000
        }))
        .unwrap();
        assert_eq!(hello.protocol, 3);
        assert_eq!(hello.device_token(), Some("dev-abc"));
        assert_eq!(hello.tick_interval_ms, Some(15000));

        let minimal: HelloOk = serde_json::from_value(json!({"protocol": 3})).unwrap();
        assert_eq!(minimal.device_token(), None);
    }

    #[test]
    fn test_credentials_are_redacted_in_debug() {
        let creds = AuthCredentials::token("super-secret");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_credentials_empty() {
        assert!(AuthCredentials::default().is_empty());
        assert!(AuthCredentials::token("").is_empty());
        assert!(!AuthCredentials::password("pw").is_empty());
    }
}
