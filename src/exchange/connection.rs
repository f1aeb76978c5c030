//! Upstream connection handle.
//!
//! # Responsibilities
//! - Own the upstream response body (and with it the pooled connection)
//! - Generate unique connection IDs for tracing
//! - Dispose the connection exactly once
//!
//! # Design Decisions
//! - Ownership moves dispatch → exchange attributes → response body, never shared
//! - `dispose` is idempotent; `Drop` disposes too, so cancellation (dropping the
//!   future that owns the exchange) releases the connection without extra code
//! - Dropping an unfinished hyper body closes the connection instead of returning
//!   it to the pool

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::Bytes;
use hyper::body::{Body as HttpBody, Frame};

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough, only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upstream-{}", self.0)
    }
}

type DisposeHook = Box<dyn FnOnce() + Send>;

struct ConnectionInner {
    body: Body,
    on_dispose: Option<DisposeHook>,
}

/// One upstream connection, owned by exactly one exchange.
///
/// The body sits behind a mutex only so the exchange stays `Sync`; every access
/// goes through `&mut self`, so the lock is never contended.
pub struct UpstreamConnection {
    id: ConnectionId,
    inner: Mutex<Option<ConnectionInner>>,
}

impl UpstreamConnection {
    pub fn new(body: Body) -> Self {
        let id = ConnectionId::new();
        tracing::trace!(connection_id = %id, "Upstream connection acquired");
        Self {
            id,
            inner: Mutex::new(Some(ConnectionInner {
                body,
                on_dispose: None,
            })),
        }
    }

    /// Registers a callback that runs when the connection is disposed.
    pub fn on_dispose(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        if let Some(inner) = self.inner_mut() {
            inner.on_dispose = Some(Box::new(hook));
        }
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_disposed(&mut self) -> bool {
        self.inner_mut().is_none()
    }

    /// Polls the next frame of the upstream body. A disposed connection is at
    /// end of stream.
    pub fn poll_frame(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        match self.inner_mut() {
            Some(inner) => Pin::new(&mut inner.body).poll_frame(cx),
            None => Poll::Ready(None),
        }
    }

    /// Releases the connection. Returns `false` if it was already disposed.
    pub fn dispose(&mut self) -> bool {
        let Some(inner) = self.inner_mut().take() else {
            return false;
        };
        drop(inner.body);
        if let Some(hook) = inner.on_dispose {
            hook();
        }
        tracing::trace!(connection_id = %self.id, "Upstream connection disposed");
        true
    }

    fn inner_mut(&mut self) -> &mut Option<ConnectionInner> {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for UpstreamConnection {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for UpstreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConnection")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
