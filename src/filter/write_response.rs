//! Response writer stage.
//!
//! # Responsibilities
//! - Run the rest of the chain first, then attach the upstream body to the response
//! - Pick flush-per-chunk or buffered writing from the response content type
//! - Dispose the upstream connection when the chain fails
//!
//! # Design Decisions
//! - Lowest order of all filters, so its post-work runs after every other post-work
//! - Cancellation needs no code here: dropping the exchange drops the connection,
//!   which disposes itself
//! - A malformed content type is treated as non-streaming

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use axum::http::header;

use crate::error::GatewayError;
use crate::exchange::{Exchange, WriteMode};
use crate::filter::{Chain, GatewayFilter};

/// `type/subtype` with parameters dropped. `*` acts as a wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    kind: String,
    subtype: String,
}

impl MediaType {
    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        let part = |a: &str, b: &str| a == "*" || b == "*" || a == b;
        part(&self.kind, &other.kind) && part(&self.subtype, &other.subtype)
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let essence = text.split(';').next().unwrap_or_default().trim();
        let (kind, subtype) = essence
            .split_once('/')
            .ok_or_else(|| format!("'{text}' has no subtype"))?;
        let is_token = |s: &str| {
            !s.is_empty()
                && s.bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b"!#$&^_.+-*".contains(&b))
        };
        if !is_token(kind) || !is_token(subtype) {
            return Err(format!("'{text}' is not a valid media type"));
        }
        Ok(Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)
    }
}

/// Media types written with per-chunk flushing unless configured otherwise.
pub const DEFAULT_STREAMING_MEDIA_TYPES: [&str; 2] = ["text/event-stream", "application/stream+json"];

/// Copies the upstream body to the client. Runs first in the chain.
#[derive(Debug, Clone)]
pub struct WriteResponseFilter {
    streaming_media_types: Vec<MediaType>,
}

impl WriteResponseFilter {
    pub const ORDER: i32 = -1;

    pub fn new(streaming_media_types: Vec<MediaType>) -> Self {
        Self {
            streaming_media_types,
        }
    }

    /// Write mode for a `Content-Type` value.
    pub fn write_mode(&self, content_type: Option<&str>) -> WriteMode {
        let streaming = content_type
            .and_then(|raw| raw.parse::<MediaType>().ok())
            .is_some_and(|media| self.streaming_media_types.iter().any(|s| s.is_compatible_with(&media)));
        if streaming {
            WriteMode::FlushEachChunk
        } else {
            WriteMode::Buffered
        }
    }
}

impl Default for WriteResponseFilter {
    fn default() -> Self {
        Self::new(
            DEFAULT_STREAMING_MEDIA_TYPES
                .iter()
                .filter_map(|m| m.parse().ok())
                .collect(),
        )
    }
}

#[async_trait]
impl GatewayFilter for WriteResponseFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError> {
        if let Err(error) = chain.proceed(exchange).await {
            if let Some(mut connection) = exchange.attributes.upstream_connection.take() {
                connection.dispose();
            }
            return Err(error);
        }

        let Some(connection) = exchange.attributes.upstream_connection.take() else {
            return Ok(());
        };

        let content_type = exchange
            .response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| exchange.attributes.original_content_type.clone());
        let mode = self.write_mode(content_type.as_deref());

        tracing::debug!(
            exchange_id = %exchange.id(),
            connection_id = %connection.id(),
            content_type = content_type.as_deref().unwrap_or("-"),
            mode = ?mode,
            "Writing upstream response"
        );
        let exchange_id = exchange.id();
        exchange.response.write_with(connection, mode, exchange_id);
        Ok(())
    }
}
