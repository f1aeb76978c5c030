//! Upstream HTTP client.
//!
//! # Responsibilities
//! - Send one request upstream and return once response headers arrive
//! - Hand the response body back as an [`UpstreamConnection`]
//!
//! # Design Decisions
//! - The dispatch stage talks to a trait so the transport can be swapped in tests
//! - Connection pooling and connect timeouts live in the hyper-util legacy client
//! - `http` and `https` upstreams share one pool; TLS to the upstream uses rustls
//!   with the ring provider and the webpki root store
//! - The request target is forwarded as given; no path normalization happens here

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, Uri, Version};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::config::schema::HttpClientConfig;
use crate::exchange::UpstreamConnection;

/// Request handed to the upstream client.
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Uri,
    pub headers: HeaderMap,
    pub body: Body,
}

impl fmt::Debug for UpstreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Response head plus the connection that carries the body.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// Raw status code; not guaranteed to be a known status.
    pub status: u16,
    pub version: Version,
    pub headers: HeaderMap,
    pub connection: UpstreamConnection,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("unsupported upstream scheme: {0}")]
    UnsupportedScheme(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("{0}")]
    Transport(String),
}

/// Non-blocking HTTP client used by the dispatch stage.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ClientError>;
}

/// [`UpstreamClient`] backed by the hyper-util pooled client.
#[derive(Clone)]
pub struct HyperUpstreamClient {
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HyperUpstreamClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self, ClientError> {
        let mut http = HttpConnector::new();
        http.set_connect_timeout(Some(Duration::from_millis(config.connect_timeout_ms)));
        http.set_nodelay(true);
        // the TLS connector hands https targets to the TCP connector
        http.enforce_http(false);

        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| ClientError::Tls(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .build(connector);
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamClient for HyperUpstreamClient {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ClientError> {
        match request.url.scheme_str() {
            Some("http" | "https") => {}
            other => return Err(ClientError::UnsupportedScheme(other.unwrap_or_default().to_string())),
        }

        let mut outbound = Request::new(request.body);
        *outbound.method_mut() = request.method;
        *outbound.uri_mut() = request.url;
        *outbound.headers_mut() = request.headers;

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| ClientError::Transport(format_chain(&e)))?;

        let (parts, body) = response.into_parts();
        Ok(UpstreamResponse {
            status: parts.status.as_u16(),
            version: parts.version,
            headers: parts.headers,
            connection: UpstreamConnection::new(Body::new(body)),
        })
    }
}

fn format_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn request(url: &str) -> UpstreamRequest {
        UpstreamRequest {
            method: Method::GET,
            url: url.parse().unwrap(),
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    async fn closed_port() -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn test_https_scheme_is_dispatched() {
        let client = HyperUpstreamClient::new(&HttpClientConfig::default()).unwrap();
        let addr = closed_port().await;

        let err = client.send(request(&format!("https://{addr}/"))).await.unwrap_err();

        // reaches the connector instead of being refused up front
        assert!(matches!(err, ClientError::Transport(_)), "{err}");
    }

    #[tokio::test]
    async fn test_https_handshake_is_attempted() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // not a TLS server
            let _ = socket.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
        });

        let client = HyperUpstreamClient::new(&HttpClientConfig::default()).unwrap();
        let err = client.send(request(&format!("https://{addr}/"))).await.unwrap_err();

        accepted.await.unwrap();
        assert!(matches!(err, ClientError::Transport(_)), "{err}");
    }

    #[tokio::test]
    async fn test_other_schemes_are_rejected() {
        let client = HyperUpstreamClient::new(&HttpClientConfig::default()).unwrap();
        let err = client.send(request("ws://localhost:1/")).await.unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedScheme(ref s) if s == "ws"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        let addr = closed_port().await;
        let client = HyperUpstreamClient::new(&HttpClientConfig::default()).unwrap();
        let err = client.send(request(&format!("http://{addr}/"))).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn test_target_is_sent_verbatim() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let head = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            let _ = socket
                .write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n")
                .await;
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let client = HyperUpstreamClient::new(&HttpClientConfig::default()).unwrap();
        let response = client
            .send(request(&format!("http://{addr}/api/%2e%2e/admin")))
            .await
            .unwrap();

        assert_eq!(response.status, 204);
        assert!(head.await.unwrap().starts_with("GET /api/%2e%2e/admin HTTP/1.1"));
    }
}
