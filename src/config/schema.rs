//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::definition::Definition;
use crate::filter::write_response::DEFAULT_STREAMING_MEDIA_TYPES;
use crate::predicate::PredicateDefinition;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream client settings.
    pub http_client: HttpClientConfig,

    /// Forward the inbound `Host` header upstream for every route.
    pub preserve_host: bool,

    /// Content types copied to the client with a flush per chunk.
    pub streaming_media_types: Vec<String>,

    /// Filters prepended to every route's filter list.
    pub default_filters: Vec<Definition>,

    /// Header filter pipeline.
    pub headers: HeadersConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Route definitions.
    pub routes: Vec<RouteDefinition>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            http_client: HttpClientConfig::default(),
            preserve_host: false,
            streaming_media_types: DEFAULT_STREAMING_MEDIA_TYPES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            default_filters: Vec::new(),
            headers: HeadersConfig::default(),
            observability: ObservabilityConfig::default(),
            routes: Vec::new(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Time allowed until upstream response headers arrive. Absent = no limit.
    pub response_timeout_ms: Option<u64>,

    /// Idle pooled connections are closed after this many seconds.
    pub pool_idle_timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            response_timeout_ms: None,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// Header filter pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeadersConfig {
    /// Strip hop-by-hop headers in both directions.
    pub remove_hop_by_hop: bool,

    /// Request headers never forwarded upstream.
    pub request_deny: Vec<String>,

    /// Upstream response headers never returned to the client.
    pub response_deny: Vec<String>,

    /// When set, only these request headers are forwarded.
    pub request_allow: Option<Vec<String>>,

    /// When set, only these response headers are returned.
    pub response_allow: Option<Vec<String>>,

    /// Add `X-Forwarded-*` headers to upstream requests.
    pub forwarded: bool,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            remove_hop_by_hop: true,
            request_deny: Vec::new(),
            response_deny: Vec::new(),
            request_allow: None,
            response_allow: None,
            forwarded: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// A route: predicates select it, filters shape the exchange, `uri` is the target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteDefinition {
    /// Unique route identifier for logging.
    pub id: String,

    /// Target URI, e.g. `http://orders:8080` or `lb:ws://payment-service`.
    pub uri: String,

    /// Lower orders are tried first.
    #[serde(default)]
    pub order: i32,

    /// Predicates; all must pass.
    #[serde(default)]
    pub predicates: Vec<PredicateDefinition>,

    /// Route filters, applied after the default filters on equal order.
    #[serde(default)]
    pub filters: Vec<Definition>,

    /// Overrides `http_client.response_timeout_ms` for this route.
    #[serde(default)]
    pub response_timeout_ms: Option<u64>,

    /// Overrides the gateway-wide `preserve_host`.
    #[serde(default)]
    pub preserve_host: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(
            config.streaming_media_types,
            vec!["text/event-stream", "application/stream+json"]
        );
        assert!(config.headers.remove_hop_by_hop);
        assert!(config.http_client.response_timeout_ms.is_none());
    }

    #[test]
    fn test_full_config() {
        let config: GatewayConfig = toml::from_str(
            r#"
            preserve_host = true
            default_filters = ["AddResponseHeader=X-Gateway, filter-gateway"]

            [http_client]
            response_timeout_ms = 2000

            [headers]
            request_deny = ["x-internal-token"]

            [[routes]]
            id = "payments"
            uri = "lb:ws://payment-service"
            order = 0
            predicates = ["Path=/payments/**", { name = "Method", args = { methods = ["GET", "POST"] } }]
            filters = ["StripPrefix=1"]
            response_timeout_ms = 500
            "#,
        )
        .unwrap();

        assert!(config.preserve_host);
        assert_eq!(config.http_client.response_timeout_ms, Some(2000));
        assert_eq!(config.default_filters[0].name, "AddResponseHeader");
        let route = &config.routes[0];
        assert_eq!(route.id, "payments");
        assert_eq!(route.predicates.len(), 2);
        assert_eq!(route.response_timeout_ms, Some(500));
        assert_eq!(route.preserve_host, None);
    }
}
