//! Upstream dispatch stage.
//!
//! # Responsibilities
//! - Forward the request to the upstream URL exactly once
//! - Race response headers against the response timeout
//! - Store status, filtered headers and the connection without writing to the client
//!
//! # Design Decisions
//! - The already-routed marker is set before the outbound call and stays set on
//!   failure, so nothing downstream can dispatch the same exchange again
//! - The timeout bounds time-to-headers only; body streaming is not timed
//! - The connection is stored before status validation so a rejected response is
//!   still disposed by the response writer

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, StatusCode};

use crate::client::{UpstreamClient, UpstreamRequest};
use crate::error::GatewayError;
use crate::exchange::{Exchange, UpstreamResponseInfo};
use crate::filter::{Chain, GatewayFilter};
use crate::headers::{filter_headers, Direction, HeadersFilter};

/// Sends the request upstream. Runs last in the chain.
pub struct RoutingFilter {
    client: Arc<dyn UpstreamClient>,
    headers: Arc<[Arc<dyn HeadersFilter>]>,
    response_timeout: Option<Duration>,
}

impl RoutingFilter {
    pub const ORDER: i32 = i32::MAX;

    pub fn new(
        client: Arc<dyn UpstreamClient>,
        headers: Vec<Arc<dyn HeadersFilter>>,
        response_timeout: Option<Duration>,
    ) -> Self {
        Self {
            client,
            headers: headers.into(),
            response_timeout,
        }
    }
}

impl std::fmt::Debug for RoutingFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingFilter")
            .field("headers", &self.headers)
            .field("response_timeout", &self.response_timeout)
            .finish_non_exhaustive()
    }
}

/// Maps a raw upstream status onto [`StatusCode`].
///
/// Unregistered codes in 100..=999 are carried through as-is; anything else is
/// rejected.
pub fn resolve_status(raw: u16) -> Result<StatusCode, GatewayError> {
    match StatusCode::from_u16(raw) {
        Ok(status) if status.canonical_reason().is_some() => Ok(status),
        Ok(status) => {
            tracing::debug!(status = raw, "Passing through unregistered upstream status");
            Ok(status)
        }
        Err(_) => Err(GatewayError::IllegalStatusCode(raw)),
    }
}

#[async_trait]
impl GatewayFilter for RoutingFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError> {
        let Some(url) = exchange.attributes.upstream_url.clone() else {
            return chain.proceed(exchange).await;
        };
        if exchange.attributes.is_routed() || !matches!(url.scheme_str(), Some("http" | "https")) {
            return chain.proceed(exchange).await;
        }
        exchange.attributes.mark_routed();

        let mut headers = filter_headers(
            &self.headers,
            exchange.request_headers(),
            exchange,
            Direction::Request,
        );
        match exchange.request_headers().get(header::HOST) {
            Some(host) if exchange.attributes.preserve_host => {
                headers.insert(header::HOST, host.clone());
            }
            _ => {
                headers.remove(header::HOST);
            }
        }

        let request = UpstreamRequest {
            method: exchange.method().clone(),
            url: url.clone(),
            headers,
            body: exchange.take_body().unwrap_or_else(Body::empty),
        };

        let timeout = exchange
            .attributes
            .matched_route
            .as_ref()
            .and_then(|route| route.response_timeout)
            .or(self.response_timeout);

        tracing::debug!(
            exchange_id = %exchange.id(),
            method = %request.method,
            url = %url,
            "Dispatching upstream"
        );

        let send = self.client.send(request);
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, send).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        exchange_id = %exchange.id(),
                        url = %url,
                        timeout_ms = limit.as_millis() as u64,
                        "Upstream response timed out"
                    );
                    return Err(GatewayError::UpstreamTimeout(limit));
                }
            },
            None => send.await,
        };
        let response = outcome.map_err(|e| {
            tracing::warn!(exchange_id = %exchange.id(), url = %url, error = %e, "Upstream request failed");
            GatewayError::UpstreamConnect(e.to_string())
        })?;

        tracing::trace!(
            exchange_id = %exchange.id(),
            connection_id = %response.connection.id(),
            status = response.status,
            "Upstream response headers received"
        );
        exchange.attributes.upstream_connection = Some(response.connection);

        let status = resolve_status(response.status).inspect_err(|_| {
            tracing::error!(
                exchange_id = %exchange.id(),
                url = %url,
                status = response.status,
                "Unable to set status code on response"
            );
        })?;
        exchange.response.set_status(status);

        let mut filtered = filter_headers(&self.headers, &response.headers, exchange, Direction::Response);
        if filtered.contains_key(header::TRANSFER_ENCODING) && filtered.contains_key(header::CONTENT_LENGTH) {
            filtered.remove(header::TRANSFER_ENCODING);
        }

        exchange.attributes.original_content_type = response
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        exchange.attributes.filtered_response_header_names = Some(filtered.keys().cloned().collect());
        exchange.response.headers_mut().extend(filtered);
        exchange.attributes.upstream_response = Some(UpstreamResponseInfo {
            status: response.status,
            version: response.version,
            headers: response.headers,
        });

        chain.proceed(exchange).await
    }
}
