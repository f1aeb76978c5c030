//! Typed per-request attributes.

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, Uri, Version};

use crate::exchange::connection::UpstreamConnection;
use crate::route::Route;

/// Status line and headers exactly as the upstream sent them.
#[derive(Debug, Clone)]
pub struct UpstreamResponseInfo {
    pub status: u16,
    pub version: Version,
    pub headers: HeaderMap,
}

/// Attributes filters share through the exchange.
#[derive(Debug, Default)]
pub struct Attributes {
    /// Route selected by the route table.
    pub matched_route: Option<Arc<Route>>,
    /// Fully merged target the request is forwarded to. The path is the inbound one, verbatim.
    pub upstream_url: Option<Uri>,
    /// Scheme stripped from `lb:ws://...` style route URIs.
    pub scheme_prefix: Option<String>,
    /// Forward the inbound `Host` header instead of deriving it from the URL.
    pub preserve_host: bool,
    /// Unfiltered upstream response.
    pub upstream_response: Option<UpstreamResponseInfo>,
    /// Connection handed from dispatch to the response writer.
    pub upstream_connection: Option<UpstreamConnection>,
    /// `Content-Type` of the upstream response before header filtering.
    pub original_content_type: Option<String>,
    /// Names of the response headers that survived the response pipeline.
    pub filtered_response_header_names: Option<HashSet<HeaderName>>,
    already_routed: bool,
}

impl Attributes {
    /// Sets the already-routed marker. Returns `false` if it was set before.
    pub fn mark_routed(&mut self) -> bool {
        !std::mem::replace(&mut self.already_routed, true)
    }

    pub fn is_routed(&self) -> bool {
        self.already_routed
    }

    pub fn route_id(&self) -> Option<&str> {
        self.matched_route.as_deref().map(|route| route.id.as_str())
    }
}
