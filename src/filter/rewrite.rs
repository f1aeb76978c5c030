//! Route URI → upstream URL rewrite.
//!
//! # Responsibilities
//! - Unwrap scheme-prefixed route URIs (`lb:ws://service` → prefix `lb`, `ws://service`)
//! - Reject `lb` URIs without a valid host
//! - Merge the route's scheme, host and port with the inbound path and query
//!
//! # Design Decisions
//! - The upstream target is an `http::Uri`, not a `Url`: the inbound path and query
//!   are copied raw, so already percent-encoded octets are neither encoded a second
//!   time nor decoded, and dot segments reach the upstream as sent
//! - The route URI's own path and query are ignored
//! - Without a matched route the stage only proceeds

use async_trait::async_trait;
use axum::http::uri::PathAndQuery;
use axum::http::Uri;
use url::Url;

use crate::error::{ConfigurationError, GatewayError};
use crate::exchange::Exchange;
use crate::filter::{Chain, GatewayFilter};

/// Route URI with any scheme prefix removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRouteUri {
    pub scheme_prefix: Option<String>,
    pub uri: Url,
}

/// Unwraps a scheme prefix and checks `lb` hosts.
pub fn resolve_route_uri(route_uri: &Url) -> Result<ResolvedRouteUri, ConfigurationError> {
    let (scheme_prefix, uri) = if has_another_scheme(route_uri) {
        let inner = Url::parse(route_uri.path())
            .map_err(|_| ConfigurationError::InvalidHost(route_uri.to_string()))?;
        (Some(route_uri.scheme().to_string()), inner)
    } else {
        (None, route_uri.clone())
    };

    if uri.scheme().eq_ignore_ascii_case("lb") && !uri.host_str().is_some_and(is_valid_hostname) {
        return Err(ConfigurationError::InvalidHost(uri.to_string()));
    }

    Ok(ResolvedRouteUri { scheme_prefix, uri })
}

/// True for URIs like `lb:ws://service`: no host, and the scheme-specific part
/// starts with another scheme.
fn has_another_scheme(uri: &Url) -> bool {
    uri.cannot_be_a_base() && uri.query().is_none() && starts_with_scheme(uri.path())
}

/// `[a-zA-Z][a-zA-Z0-9+.-]*:` at the start of `text`.
fn starts_with_scheme(text: &str) -> bool {
    let Some((scheme, _)) = text.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}

/// RFC 1123 host name: dot-separated labels of letters, digits and inner hyphens.
fn is_valid_hostname(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

/// True when the inbound path or query carries percent-encoded octets.
pub fn contains_encoded_parts(uri: &Uri) -> bool {
    let is_encoded = |text: &str| {
        text.as_bytes()
            .windows(3)
            .any(|w| w[0] == b'%' && w[1].is_ascii_hexdigit() && w[2].is_ascii_hexdigit())
    };
    is_encoded(uri.path()) || uri.query().is_some_and(is_encoded)
}

/// Scheme, host and port from `route_uri`; path and query from `inbound`.
///
/// The inbound path and query are copied byte for byte. Dot segments, literal or
/// percent-encoded, are never resolved here.
pub fn merge(route_uri: &Url, inbound: &Uri) -> Result<Uri, axum::http::Error> {
    let host = route_uri.host_str().unwrap_or_default();
    let authority = match route_uri.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let path_and_query = inbound
        .path_and_query()
        .map(PathAndQuery::as_str)
        .filter(|raw| raw.starts_with('/'))
        .unwrap_or("/");

    Uri::builder()
        .scheme(route_uri.scheme())
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
}

/// Computes the upstream URL for the matched route.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteToRequestUrlFilter;

impl RouteToRequestUrlFilter {
    pub const ORDER: i32 = 10000;
}

#[async_trait]
impl GatewayFilter for RouteToRequestUrlFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError> {
        let Some(route) = exchange.attributes.matched_route.clone() else {
            return chain.proceed(exchange).await;
        };

        let encoded = contains_encoded_parts(exchange.uri());
        let resolved = resolve_route_uri(&route.uri)?;
        if let Some(prefix) = resolved.scheme_prefix {
            exchange.attributes.scheme_prefix = Some(prefix);
        }

        let upstream = merge(&resolved.uri, exchange.uri()).map_err(|e| {
            ConfigurationError::InvalidUri {
                route: route.id.clone(),
                reason: e.to_string(),
            }
        })?;
        tracing::debug!(
            exchange_id = %exchange.id(),
            route_id = %route.id,
            url = %upstream,
            encoded,
            "Upstream URL resolved"
        );
        exchange.attributes.upstream_url = Some(upstream);

        chain.proceed(exchange).await
    }
}
