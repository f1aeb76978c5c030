//! Server response under construction and the body writers.
//!
//! # Responsibilities
//! - Hold status, headers and body until the exchange is committed
//! - Copy the upstream body to the client, flushing per chunk or buffered
//! - Dispose the upstream connection on completion, error or cancellation
//!
//! # Design Decisions
//! - Nothing reaches the client until the handler converts the exchange, so post-work
//!   of every filter can still change status and headers
//! - The writer pulls from the upstream only when hyper polls it: backpressure comes
//!   from the client connection
//! - A failed copy ends the body with an error; the head is already sent so no new
//!   response is produced

use std::fmt;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use hyper::body::{Body as HttpBody, Frame};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::exchange::connection::UpstreamConnection;

/// Buffered writes are emitted once this many bytes accumulate.
pub const BUFFER_CAPACITY: usize = 8 * 1024;

/// How upstream chunks are written to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Every upstream chunk is written as soon as it arrives.
    FlushEachChunk,
    /// Chunks are coalesced up to [`BUFFER_CAPACITY`] or end of stream.
    Buffered,
}

/// Response the client will receive.
#[derive(Default)]
pub struct ServerResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Mutex<Option<Body>>,
    write_mode: Option<WriteMode>,
}

impl ServerResponse {
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn set_body(&mut self, body: Body) {
        *self.body_mut() = Some(body);
    }

    /// Installs the writer that streams the upstream connection to the client.
    pub fn write_with(&mut self, connection: UpstreamConnection, mode: WriteMode, exchange_id: Uuid) {
        self.write_mode = Some(mode);
        self.set_body(Body::new(StreamingBody::new(connection, mode, exchange_id)));
    }

    pub fn write_mode(&self) -> Option<WriteMode> {
        self.write_mode
    }

    /// Commits the response. A missing status means 200.
    pub fn into_response(mut self) -> Response {
        let body = self.body_mut().take().unwrap_or_else(Body::empty);
        let mut response = Response::new(body);
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = std::mem::take(&mut self.headers);
        response
    }

    fn body_mut(&mut self) -> &mut Option<Body> {
        self.body.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ServerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("write_mode", &self.write_mode)
            .finish_non_exhaustive()
    }
}

/// Response body that copies an upstream connection to the client.
pub struct StreamingBody {
    connection: UpstreamConnection,
    mode: WriteMode,
    buffer: BytesMut,
    trailers: Option<Frame<Bytes>>,
    exchange_id: Uuid,
    bytes_written: u64,
    finished: bool,
}

impl StreamingBody {
    pub fn new(connection: UpstreamConnection, mode: WriteMode, exchange_id: Uuid) -> Self {
        Self {
            connection,
            mode,
            buffer: BytesMut::new(),
            trailers: None,
            exchange_id,
            bytes_written: 0,
            finished: false,
        }
    }

    fn flush_buffer(&mut self) -> Option<Frame<Bytes>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(Frame::data(self.buffer.split().freeze()))
        }
    }

    fn complete(&mut self) {
        if !self.finished {
            self.finished = true;
            self.connection.dispose();
            tracing::debug!(
                exchange_id = %self.exchange_id,
                connection_id = %self.connection.id(),
                bytes = self.bytes_written,
                "Response stream complete"
            );
        }
    }
}

impl HttpBody for StreamingBody {
    type Data = Bytes;
    type Error = GatewayError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.finished {
            let pending = this.flush_buffer().or_else(|| this.trailers.take());
            return Poll::Ready(pending.map(Ok));
        }

        loop {
            match this.connection.poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                    Ok(data) => {
                        this.bytes_written += data.len() as u64;
                        match this.mode {
                            WriteMode::FlushEachChunk => {
                                return Poll::Ready(Some(Ok(Frame::data(data))));
                            }
                            WriteMode::Buffered => {
                                this.buffer.extend_from_slice(&data);
                                if this.buffer.len() >= BUFFER_CAPACITY {
                                    return Poll::Ready(this.flush_buffer().map(Ok));
                                }
                            }
                        }
                    }
                    Err(frame) => {
                        if frame.is_trailers() {
                            this.trailers = Some(frame);
                        }
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    let error = GatewayError::StreamingWrite(e.to_string());
                    tracing::warn!(
                        exchange_id = %this.exchange_id,
                        connection_id = %this.connection.id(),
                        error = %error,
                        "Response stream failed"
                    );
                    this.buffer.clear();
                    this.trailers = None;
                    this.complete();
                    return Poll::Ready(Some(Err(error)));
                }
                Poll::Ready(None) => {
                    this.complete();
                    let pending = this.flush_buffer().or_else(|| this.trailers.take());
                    return Poll::Ready(pending.map(Ok));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished && self.buffer.is_empty() && self.trailers.is_none()
    }
}

impl Drop for StreamingBody {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                exchange_id = %self.exchange_id,
                connection_id = %self.connection.id(),
                bytes = self.bytes_written,
                "Response stream cancelled"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use http_body_util::{BodyExt, StreamBody};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn chunked(chunks: &[&'static str]) -> Body {
        let frames: Vec<Result<Frame<Bytes>, std::io::Error>> = chunks
            .iter()
            .map(|c| Ok(Frame::data(Bytes::from_static(c.as_bytes()))))
            .collect();
        Body::new(StreamBody::new(stream::iter(frames)))
    }

    fn connection(body: Body) -> (UpstreamConnection, Arc<AtomicUsize>) {
        let disposed = Arc::new(AtomicUsize::new(0));
        let counter = disposed.clone();
        let conn = UpstreamConnection::new(body).on_dispose(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (conn, disposed)
    }

    async fn frames(mut body: StreamingBody) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(frame) = body.frame().await {
            if let Ok(data) = frame.unwrap().into_data() {
                out.push(data);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_flush_mode_emits_every_chunk() {
        let (conn, disposed) = connection(chunked(&["data: a\n\n", "data: b\n\n"]));
        let body = StreamingBody::new(conn, WriteMode::FlushEachChunk, Uuid::new_v4());
        let out = frames(body).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], Bytes::from_static(b"data: b\n\n"));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_buffered_mode_coalesces() {
        let (conn, disposed) = connection(chunked(&["{\"a\":", "1", "}"]));
        let body = StreamingBody::new(conn, WriteMode::Buffered, Uuid::new_v4());
        let out = frames(body).await;
        assert_eq!(out, vec![Bytes::from_static(b"{\"a\":1}")]);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_disposes_once() {
        let frames: Vec<Result<Frame<Bytes>, std::io::Error>> = vec![
            Ok(Frame::data(Bytes::from_static(b"partial"))),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let (conn, disposed) = connection(Body::new(StreamBody::new(stream::iter(frames))));
        let mut body = StreamingBody::new(conn, WriteMode::FlushEachChunk, Uuid::new_v4());

        assert!(body.frame().await.unwrap().is_ok());
        let err = body.frame().await.unwrap().unwrap_err();
        assert!(matches!(err, GatewayError::StreamingWrite(_)));
        assert!(body.frame().await.is_none());
        drop(body);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_stream_disposes_once() {
        let (conn, disposed) = connection(chunked(&["one", "two", "three"]));
        let mut body = StreamingBody::new(conn, WriteMode::FlushEachChunk, Uuid::new_v4());
        assert!(body.frame().await.is_some());
        drop(body);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_status_is_ok() {
        let response = ServerResponse::default().into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
