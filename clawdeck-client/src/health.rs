//! Out-of-band HTTP health probe.

use crate::error::ClientError;
use clawdeck_protocol::types::GatewayHealth;
use std::time::Duration;
use url::Url;

/// Derives the health endpoint from the gateway socket URL:
/// `ws` becomes `http`, `wss` becomes `https`, a trailing slash is dropped
/// and `/health` is appended.
pub fn health_url(gateway_url: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(gateway_url)?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidUrl(gateway_url.to_string()))?;

    let path = format!("{}/health", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// HTTP GET against the gateway's `/health` endpoint.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    http: reqwest::Client,
}

impl HealthProbe {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }

    /// Fetches the health document. Any transport failure, non-2xx status or
    /// undecodable body is an error.
    pub async fn check(
        &self,
        gateway_url: &str,
        token: Option<&str>,
    ) -> Result<GatewayHealth, ClientError> {
        let url = health_url(gateway_url)?;
        tracing::debug!("Probing {}", url);

        let mut request = self.http.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<GatewayHealth>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_url_scheme_swap() {
        assert_eq!(
            health_url("ws://127.0.0.1:18789").unwrap().as_str(),
            "http://127.0.0.1:18789/health"
        );
        assert_eq!(
            health_url("wss://gw.example.com/").unwrap().as_str(),
            "https://gw.example.com/health"
        );
        assert_eq!(
            health_url("wss://gw.example.com/base/").unwrap().as_str(),
            "https://gw.example.com/base/health"
        );
    }

    #[test]
    fn test_health_url_rejects_other_schemes() {
        assert!(matches!(
            health_url("ftp://host"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(health_url("not a url"), Err(ClientError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_check_fails_for_unreachable_gateway() {
        let probe = HealthProbe::new(Duration::from_millis(200));
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let result = probe.check("ws://127.0.0.1:9", Some("tok")).await;
        assert!(result.is_err());
    }
}
