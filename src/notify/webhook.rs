// ABOUTME: HTTP webhook notifier.
// ABOUTME: One HTTP/1.1 POST of the JSON event per notification, bounded by a timeout.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpStream;

use super::{DeployEvent, NotifyError, Notifier};
use crate::config::NotifyConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    /// Host to connect to, without IPv6 brackets.
    host: String,
    port: u16,
    /// `Host` header value, as written in the URL.
    authority: String,
    path: String,
}

impl Endpoint {
    fn parse(url: &str) -> Result<Self, NotifyError> {
        let invalid = || NotifyError::InvalidUrl(url.to_string());
        let uri: hyper::Uri = url.parse().map_err(|_| invalid())?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid());
        }
        let authority = uri.authority().ok_or_else(invalid)?;
        if authority.as_str().contains('@') {
            return Err(invalid());
        }
        let host = authority.host().trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        let path = match uri.query() {
            Some(query) => format!("{}?{}", uri.path(), query),
            None => uri.path().to_string(),
        };
        Ok(Self {
            host: host.to_string(),
            port: uri.port_u16().unwrap_or(80),
            authority: authority.as_str().to_string(),
            path,
        })
    }
}

pub struct WebhookNotifier {
    endpoint: Endpoint,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            endpoint: Endpoint::parse(url)?,
            timeout,
        })
    }

    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        Self::new(&config.webhook, config.timeout)
    }

    async fn post(&self, body: Vec<u8>) -> Result<(), NotifyError> {
        let stream = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port))
            .await
            .map_err(|e| NotifyError::Connect(e.to_string()))?;

        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| NotifyError::Http(format!("handshake failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("webhook connection error: {}", e);
            }
        });

        let req = hyper::Request::builder()
            .method("POST")
            .uri(&self.endpoint.path)
            .header("Host", &self.endpoint.authority)
            .header("Content-Type", "application/json")
            .header("User-Agent", concat!("hotswap/", env!("CARGO_PKG_VERSION")))
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| NotifyError::Http(format!("failed to build request: {}", e)))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, event: &DeployEvent) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(event).map_err(|e| NotifyError::Http(e.to_string()))?;
        tokio::time::timeout(self.timeout, self.post(body))
            .await
            .map_err(|_| NotifyError::Timeout(self.timeout))?
    }
}
