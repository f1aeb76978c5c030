//! Header filter pipeline.
//!
//! # Responsibilities
//! - Transform request headers before they go upstream
//! - Transform upstream response headers before they reach the client
//! - Strip hop-by-hop headers, apply allow/deny lists, add forwarding headers
//!
//! # Design Decisions
//! - A filter gets the input map by reference and returns a new map; inputs are
//!   never mutated
//! - Each filter decides which direction it applies to and passes the other through
//! - Every filter is idempotent: running the pipeline twice equals running it once
//! - Filters run in the order they are configured

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::schema::HeadersConfig;
use crate::exchange::Exchange;

/// Which leg of the exchange the headers belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Inbound request headers on their way upstream.
    Request,
    /// Upstream response headers on their way to the client.
    Response,
}

/// Stateless header transformer.
pub trait HeadersFilter: Send + Sync + fmt::Debug {
    fn filter(&self, input: &HeaderMap, exchange: &Exchange, direction: Direction) -> HeaderMap;
}

/// Runs `input` through every filter in order.
pub fn filter_headers(
    filters: &[Arc<dyn HeadersFilter>],
    input: &HeaderMap,
    exchange: &Exchange,
    direction: Direction,
) -> HeaderMap {
    filters
        .iter()
        .fold(input.clone(), |headers, filter| filter.filter(&headers, exchange, direction))
}

/// Builds the configured pipeline.
pub fn pipeline(config: &HeadersConfig) -> Vec<Arc<dyn HeadersFilter>> {
    let mut filters: Vec<Arc<dyn HeadersFilter>> = Vec::new();
    if config.remove_hop_by_hop {
        filters.push(Arc::new(RemoveHopByHopHeadersFilter));
    }
    if !config.request_deny.is_empty() {
        filters.push(Arc::new(DenyHeadersFilter::new(Direction::Request, &config.request_deny)));
    }
    if !config.response_deny.is_empty() {
        filters.push(Arc::new(DenyHeadersFilter::new(Direction::Response, &config.response_deny)));
    }
    if let Some(allow) = &config.request_allow {
        filters.push(Arc::new(AllowHeadersFilter::new(Direction::Request, allow)));
    }
    if let Some(allow) = &config.response_allow {
        filters.push(Arc::new(AllowHeadersFilter::new(Direction::Response, allow)));
    }
    if config.forwarded {
        filters.push(Arc::new(ForwardedHeadersFilter));
    }
    filters
}

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Removes hop-by-hop headers, including those named by `Connection`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveHopByHopHeadersFilter;

impl HeadersFilter for RemoveHopByHopHeadersFilter {
    fn filter(&self, input: &HeaderMap, _exchange: &Exchange, _direction: Direction) -> HeaderMap {
        let listed: HashSet<HeaderName> = input
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
            .collect();

        let mut output = input.clone();
        for name in HOP_BY_HOP.iter().chain(listed.iter()) {
            output.remove(name);
        }
        output
    }
}

/// Drops the listed headers in one direction.
#[derive(Debug, Clone)]
pub struct DenyHeadersFilter {
    direction: Direction,
    names: Vec<HeaderName>,
}

impl DenyHeadersFilter {
    pub fn new<S: AsRef<str>>(direction: Direction, names: &[S]) -> Self {
        Self {
            direction,
            names: parse_names(names),
        }
    }
}

impl HeadersFilter for DenyHeadersFilter {
    fn filter(&self, input: &HeaderMap, _exchange: &Exchange, direction: Direction) -> HeaderMap {
        let mut output = input.clone();
        if direction == self.direction {
            for name in &self.names {
                output.remove(name);
            }
        }
        output
    }
}

/// Keeps only the listed headers in one direction.
#[derive(Debug, Clone)]
pub struct AllowHeadersFilter {
    direction: Direction,
    names: HashSet<HeaderName>,
}

impl AllowHeadersFilter {
    pub fn new<S: AsRef<str>>(direction: Direction, names: &[S]) -> Self {
        Self {
            direction,
            names: parse_names(names).into_iter().collect(),
        }
    }
}

impl HeadersFilter for AllowHeadersFilter {
    fn filter(&self, input: &HeaderMap, _exchange: &Exchange, direction: Direction) -> HeaderMap {
        if direction != self.direction {
            return input.clone();
        }
        let mut output = HeaderMap::with_capacity(input.len());
        for (name, value) in input {
            if self.names.contains(name) {
                output.append(name.clone(), value.clone());
            }
        }
        output
    }
}

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");

/// Adds `X-Forwarded-*` headers to the upstream request.
///
/// The client address is appended to `X-Forwarded-For` unless it is already the
/// last hop, so a second pass leaves the headers unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardedHeadersFilter;

impl HeadersFilter for ForwardedHeadersFilter {
    fn filter(&self, input: &HeaderMap, exchange: &Exchange, direction: Direction) -> HeaderMap {
        let mut output = input.clone();
        if direction != Direction::Request {
            return output;
        }

        if let Some(addr) = exchange.client_addr() {
            let client = addr.ip().to_string();
            let existing: Vec<String> = input
                .get_all(&X_FORWARDED_FOR)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(','))
                .map(|hop| hop.trim().to_string())
                .filter(|hop| !hop.is_empty())
                .collect();
            if existing.last() != Some(&client) {
                let mut hops = existing;
                hops.push(client);
                if let Ok(value) = HeaderValue::from_str(&hops.join(", ")) {
                    output.insert(X_FORWARDED_FOR, value);
                }
            }
        }

        // the gateway terminates plain HTTP only
        let scheme = exchange.uri().scheme_str().unwrap_or("http");
        output.insert(X_FORWARDED_PROTO, HeaderValue::from_static(if scheme == "https" { "https" } else { "http" }));

        let host = input
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .or_else(|| exchange.uri().authority().map(|a| a.to_string()));
        if let Some(host) = host {
            if let Ok(value) = HeaderValue::from_str(&host) {
                output.insert(X_FORWARDED_HOST, value);
            }
            let port = host
                .rsplit_once(':')
                .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
                .map(|(_, port)| port.to_string())
                .unwrap_or_else(|| if scheme == "https" { "443" } else { "80" }.to_string());
            if let Ok(value) = HeaderValue::from_str(&port) {
                output.insert(X_FORWARDED_PORT, value);
            }
        }
        output
    }
}

fn parse_names<S: AsRef<str>>(names: &[S]) -> Vec<HeaderName> {
    names
        .iter()
        .filter_map(|name| HeaderName::from_bytes(name.as_ref().trim().as_bytes()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::testing::exchange_with;
    use axum::http::Request;

    fn sample_exchange() -> Exchange {
        exchange_with(Request::builder().uri("/orders").header("host", "gateway.local:8080"))
    }

    fn full_pipeline() -> Vec<Arc<dyn HeadersFilter>> {
        pipeline(&HeadersConfig {
            remove_hop_by_hop: true,
            request_deny: vec!["x-internal-token".into()],
            response_deny: vec!["server".into()],
            request_allow: None,
            response_allow: None,
            forwarded: true,
        })
    }

    fn request_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway.local:8080"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace-hop"));
        headers.insert("x-trace-hop", HeaderValue::from_static("1"));
        headers.insert("x-internal-token", HeaderValue::from_static("secret"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_request_pipeline() {
        let exchange = sample_exchange();
        let input = request_headers();
        let output = filter_headers(&full_pipeline(), &input, &exchange, Direction::Request);

        assert!(output.get(header::CONNECTION).is_none());
        assert!(output.get("x-trace-hop").is_none());
        assert!(output.get("x-internal-token").is_none());
        assert_eq!(output["x-forwarded-for"], "203.0.113.9, 10.0.0.7");
        assert_eq!(output["x-forwarded-host"], "gateway.local:8080");
        assert_eq!(output["x-forwarded-port"], "8080");
        assert_eq!(output["x-forwarded-proto"], "http");
        assert_eq!(output[header::ACCEPT], "application/json");
        // input untouched
        assert_eq!(input["x-internal-token"], "secret");
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let exchange = sample_exchange();
        let filters = full_pipeline();
        for direction in [Direction::Request, Direction::Response] {
            let once = filter_headers(&filters, &request_headers(), &exchange, direction);
            let twice = filter_headers(&filters, &once, &exchange, direction);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_deny_respects_direction() {
        let exchange = sample_exchange();
        let mut input = HeaderMap::new();
        input.insert(header::SERVER, HeaderValue::from_static("upstream/1.0"));
        let filters = full_pipeline();

        let response = filter_headers(&filters, &input, &exchange, Direction::Response);
        assert!(response.get(header::SERVER).is_none());
        assert!(response.get("x-forwarded-for").is_none());
    }

    #[test]
    fn test_allow_list() {
        let exchange = sample_exchange();
        let filter = AllowHeadersFilter::new(Direction::Response, &["content-type"]);
        let mut input = HeaderMap::new();
        input.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        input.insert(header::SERVER, HeaderValue::from_static("upstream"));

        let output = filter.filter(&input, &exchange, Direction::Response);
        assert_eq!(output.len(), 1);
        let untouched = filter.filter(&input, &exchange, Direction::Request);
        assert_eq!(untouched.len(), 2);
    }
}
