//! Per-request context shared by the filter chain.
//!
//! # Data Flow
//! ```text
//! inbound Request<Body>
//!     → Exchange::new (parts, body, client address, exchange id)
//!     → predicates read it (&Exchange)
//!     → filters mutate it (&mut Exchange) through the continuation chain
//!         → attributes.rs (matched route, upstream URL, connection handle, ...)
//!         → response.rs (status, headers, streaming body)
//!     → Exchange::into_response (commit)
//! ```
//!
//! # Design Decisions
//! - Exactly one exchange per inbound request, owned by the handler future
//! - Attributes are typed fields, not a string-keyed map
//! - Request body sits behind a mutex so `&Exchange` is `Send`; it is only reached
//!   through `&mut self`
//! - Dropping a running exchange is a cancellation: it is logged and the upstream
//!   connection it holds is disposed by its own `Drop`

pub mod attributes;
pub mod connection;
pub mod response;

pub use attributes::{Attributes, UpstreamResponseInfo};
pub use connection::{ConnectionId, UpstreamConnection};
pub use response::{ServerResponse, StreamingBody, WriteMode};

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use axum::body::Body;
use axum::http::{request::Parts, HeaderMap, Method, Request, Uri};
use axum::response::Response;
use uuid::Uuid;

/// Progress of the filter chain for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    NotStarted,
    /// Filter at this position in the sorted chain has been entered.
    Running(usize),
    Done,
    Failed,
}

/// Mutable request context passed through predicates and filters.
pub struct Exchange {
    id: Uuid,
    request: Parts,
    body: Mutex<Option<Body>>,
    client_addr: Option<SocketAddr>,
    state: ChainState,
    pub attributes: Attributes,
    pub response: ServerResponse,
}

impl Exchange {
    pub fn new(request: Request<Body>, client_addr: Option<SocketAddr>) -> Self {
        let (request, body) = request.into_parts();
        Self {
            id: Uuid::new_v4(),
            request,
            body: Mutex::new(Some(body)),
            client_addr,
            state: ChainState::NotStarted,
            attributes: Attributes::default(),
            response: ServerResponse::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn uri(&self) -> &Uri {
        &self.request.uri
    }

    /// Replaces the request URI seen by later filters.
    pub fn set_uri(&mut self, uri: Uri) {
        self.request.uri = uri;
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    pub fn request_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.request.headers
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// Takes the inbound body. Only the first call gets it.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ChainState) {
        self.state = state;
    }

    /// Commits the exchange into the response sent to the client.
    pub fn into_response(mut self) -> Response {
        let response = std::mem::take(&mut self.response);
        response.into_response()
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if let ChainState::Running(position) = self.state {
            tracing::debug!(
                exchange_id = %self.id,
                route_id = self.attributes.route_id().unwrap_or("-"),
                position,
                "Filter chain cancelled"
            );
        }
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("method", &self.request.method)
            .field("uri", &self.request.uri)
            .field("state", &self.state)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Exchange for a bodiless request.
    pub fn exchange(method: Method, uri: &str) -> Exchange {
        exchange_with(Request::builder().method(method).uri(uri))
    }

    pub fn exchange_with(builder: axum::http::request::Builder) -> Exchange {
        let request = builder.body(Body::empty()).unwrap();
        Exchange::new(request, Some("10.0.0.7:52000".parse().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_taken_once() {
        let mut exchange = testing::exchange(Method::POST, "/upload");
        assert!(exchange.take_body().is_some());
        assert!(exchange.take_body().is_none());
    }

    #[test]
    fn test_exchange_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Exchange>();
    }
}
