//! Stock route filters.
//!
//! # Responsibilities
//! - Add or remove request and response headers
//! - Override the response status
//! - Ask dispatch to forward the inbound `Host` header
//! - Rewrite the request path before the upstream URL is computed
//!
//! # Design Decisions
//! - Request-side changes are pre-work; response-side changes are post-work so
//!   they apply on top of what dispatch copied from the upstream
//! - Path rewrites touch the request URI only; the upstream URL is derived from it
//!   later by the rewrite stage

use async_trait::async_trait;
use axum::http::{uri::PathAndQuery, HeaderName, HeaderValue, StatusCode, Uri};

use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::filter::{Chain, GatewayFilter};

/// Appends a header to the upstream request.
#[derive(Debug, Clone)]
pub struct AddRequestHeaderFilter {
    name: HeaderName,
    value: HeaderValue,
}

impl AddRequestHeaderFilter {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }
}

#[async_trait]
impl GatewayFilter for AddRequestHeaderFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError> {
        exchange
            .request_headers_mut()
            .append(self.name.clone(), self.value.clone());
        chain.proceed(exchange).await
    }
}

/// Appends a header to the client response.
#[derive(Debug, Clone)]
pub struct AddResponseHeaderFilter {
    name: HeaderName,
    value: HeaderValue,
}

impl AddResponseHeaderFilter {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }
}

#[async_trait]
impl GatewayFilter for AddResponseHeaderFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError> {
        chain.proceed(exchange).await?;
        exchange
            .response
            .headers_mut()
            .append(self.name.clone(), self.value.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RemoveRequestHeaderFilter {
    name: HeaderName,
}

impl RemoveRequestHeaderFilter {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }
}

#[async_trait]
impl GatewayFilter for RemoveRequestHeaderFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError> {
        exchange.request_headers_mut().remove(&self.name);
        chain.proceed(exchange).await
    }
}

#[derive(Debug, Clone)]
pub struct RemoveResponseHeaderFilter {
    name: HeaderName,
}

impl RemoveResponseHeaderFilter {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }
}

#[async_trait]
impl GatewayFilter for RemoveResponseHeaderFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError> {
        chain.proceed(exchange).await?;
        exchange.response.headers_mut().remove(&self.name);
        Ok(())
    }
}

/// Overrides the response status once the upstream has answered.
#[derive(Debug, Clone)]
pub struct SetStatusFilter {
    status: StatusCode,
}

impl SetStatusFilter {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }
}

#[async_trait]
impl GatewayFilter for SetStatusFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError> {
        chain.proceed(exchange).await?;
        exchange.response.set_status(self.status);
        Ok(())
    }
}

/// Forwards the inbound `Host` header upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreserveHostHeaderFilter;

#[async_trait]
impl GatewayFilter for PreserveHostHeaderFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError> {
        exchange.attributes.preserve_host = true;
        chain.proceed(exchange).await
    }
}

/// Drops the first `parts` path segments.
#[derive(Debug, Clone, Copy)]
pub struct StripPrefixFilter {
    parts: usize,
}

impl StripPrefixFilter {
    pub fn new(parts: usize) -> Self {
        Self { parts }
    }
}

#[async_trait]
impl GatewayFilter for StripPrefixFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError> {
        let path = exchange.uri().path();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut stripped = String::from("/");
        stripped.push_str(&segments.iter().skip(self.parts).copied().collect::<Vec<_>>().join("/"));
        if path.ends_with('/') && stripped.len() > 1 {
            stripped.push('/');
        }
        set_path(exchange, &stripped);
        chain.proceed(exchange).await
    }
}

/// Prepends a fixed prefix to the path.
#[derive(Debug, Clone)]
pub struct PrefixPathFilter {
    prefix: String,
}

impl PrefixPathFilter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GatewayFilter for PrefixPathFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError> {
        let prefixed = format!("{}{}", self.prefix, exchange.uri().path());
        set_path(exchange, &prefixed);
        chain.proceed(exchange).await
    }
}

/// Replaces the path, keeping the query.
fn set_path(exchange: &mut Exchange, path: &str) {
    let path_and_query = match exchange.uri().query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut parts = exchange.uri().clone().into_parts();
    match PathAndQuery::try_from(path_and_query.as_str()) {
        Ok(pq) => parts.path_and_query = Some(pq),
        Err(e) => {
            tracing::warn!(exchange_id = %exchange.id(), path = %path, error = %e, "Rewritten path rejected");
            return;
        }
    }
    if let Ok(uri) = Uri::from_parts(parts) {
        tracing::trace!(exchange_id = %exchange.id(), uri = %uri, "Request path rewritten");
        exchange.set_uri(uri);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::testing::{exchange, exchange_with};
    use crate::filter::OrderedFilter;
    use axum::http::{header, Method, Request};

    async fn run(filters: Vec<OrderedFilter>, exchange: &mut Exchange) {
        Chain::new(&filters).proceed(exchange).await.unwrap();
    }

    #[tokio::test]
    async fn test_strip_prefix() {
        let mut ex = exchange(Method::GET, "/service/api/users?page=2");
        run(vec![OrderedFilter::new(1, StripPrefixFilter::new(1))], &mut ex).await;
        assert_eq!(ex.uri().path(), "/api/users");
        assert_eq!(ex.uri().query(), Some("page=2"));

        let mut all = exchange(Method::GET, "/a/b");
        run(vec![OrderedFilter::new(1, StripPrefixFilter::new(5))], &mut all).await;
        assert_eq!(all.uri().path(), "/");
    }

    #[tokio::test]
    async fn test_prefix_path() {
        let mut ex = exchange(Method::GET, "/users?x=1");
        run(vec![OrderedFilter::new(1, PrefixPathFilter::new("/v1/"))], &mut ex).await;
        assert_eq!(ex.uri().path(), "/v1/users");
        assert_eq!(ex.uri().query(), Some("x=1"));
    }

    #[tokio::test]
    async fn test_request_headers() {
        let mut ex = exchange_with(Request::builder().uri("/").header("x-drop", "1"));
        run(
            vec![
                OrderedFilter::new(
                    1,
                    AddRequestHeaderFilter::new(
                        HeaderName::from_static("x-request-color"),
                        HeaderValue::from_static("blue"),
                    ),
                ),
                OrderedFilter::new(2, RemoveRequestHeaderFilter::new(HeaderName::from_static("x-drop"))),
            ],
            &mut ex,
        )
        .await;
        assert_eq!(ex.request_headers()["x-request-color"], "blue");
        assert!(ex.request_headers().get("x-drop").is_none());
    }

    #[tokio::test]
    async fn test_response_post_work() {
        let mut ex = exchange(Method::GET, "/");
        ex.response
            .headers_mut()
            .insert(header::SERVER, HeaderValue::from_static("upstream"));
        run(
            vec![
                OrderedFilter::new(1, SetStatusFilter::new(StatusCode::IM_A_TEAPOT)),
                OrderedFilter::new(
                    2,
                    AddResponseHeaderFilter::new(
                        HeaderName::from_static("x-gateway"),
                        HeaderValue::from_static("on"),
                    ),
                ),
                OrderedFilter::new(3, RemoveResponseHeaderFilter::new(header::SERVER)),
                OrderedFilter::new(4, PreserveHostHeaderFilter),
            ],
            &mut ex,
        )
        .await;
        assert_eq!(ex.response.status(), Some(StatusCode::IM_A_TEAPOT));
        assert_eq!(ex.response.headers()["x-gateway"], "on");
        assert!(ex.response.headers().get(header::SERVER).is_none());
        assert!(ex.attributes.preserve_host);
    }
}
