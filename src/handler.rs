//! Filter chain orchestrator.
//!
//! # Responsibilities
//! - Resolve the route for an exchange
//! - Merge the route's filters with the global filters and run the chain
//! - Track chain state (NotStarted → Running(i) → Done | Failed)
//!
//! # Design Decisions
//! - No route means routing-not-found before any upstream I/O
//! - The chain is assembled once per request from immutable, shared filters
//! - The first failure propagates out unchanged; entered filters unwind normally
//! - Cancellation is dropping the `handle` future; see `Exchange`'s `Drop`

use std::sync::Arc;
use std::time::Duration;

use crate::client::UpstreamClient;
use crate::config::schema::GatewayConfig;
use crate::error::GatewayError;
use crate::exchange::{ChainState, Exchange};
use crate::filter::write_response::MediaType;
use crate::filter::{
    merge_filters, Chain, OrderedFilter, RouteToRequestUrlFilter, RoutingFilter, WriteResponseFilter,
};
use crate::headers;
use crate::route::{Route, RouteTable};

/// Runs inbound exchanges through the route table and the filter chain.
#[derive(Debug)]
pub struct FilterChainHandler {
    routes: Arc<RouteTable>,
    global_filters: Vec<OrderedFilter>,
    preserve_host: bool,
}

impl FilterChainHandler {
    pub fn new(routes: Arc<RouteTable>, global_filters: Vec<OrderedFilter>, preserve_host: bool) -> Self {
        Self {
            routes,
            global_filters,
            preserve_host,
        }
    }

    /// Handler with the core global filters configured from `config`.
    pub fn from_config(
        config: &GatewayConfig,
        routes: Arc<RouteTable>,
        client: Arc<dyn UpstreamClient>,
    ) -> Self {
        Self::new(routes, core_filters(config, client), config.preserve_host)
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// Chain for `route`: global filters and route filters, sorted by order.
    pub fn assemble(&self, route: &Route) -> Vec<OrderedFilter> {
        merge_filters(&self.global_filters, &route.filters)
    }

    /// Routes and runs one exchange. The response is left on the exchange.
    pub async fn handle(&self, exchange: &mut Exchange) -> Result<(), GatewayError> {
        let Some(route) = self.routes.lookup(exchange).await else {
            tracing::debug!(
                exchange_id = %exchange.id(),
                method = %exchange.method(),
                path = %exchange.uri().path(),
                "No route matched"
            );
            exchange.set_state(ChainState::Failed);
            return Err(GatewayError::RoutingNotFound {
                path: exchange.uri().path().to_string(),
            });
        };

        exchange.attributes.preserve_host = route.preserve_host.unwrap_or(self.preserve_host);
        exchange.attributes.matched_route = Some(Arc::clone(&route));

        let filters = self.assemble(&route);
        let result = Chain::new(&filters).proceed(exchange).await;
        match &result {
            Ok(()) => exchange.set_state(ChainState::Done),
            Err(e) => {
                exchange.set_state(ChainState::Failed);
                tracing::debug!(
                    exchange_id = %exchange.id(),
                    route_id = %route.id,
                    error = %e,
                    "Filter chain failed"
                );
            }
        }
        result
    }
}

/// `WriteResponseFilter`, `RouteToRequestUrlFilter` and `RoutingFilter`.
pub fn core_filters(config: &GatewayConfig, client: Arc<dyn UpstreamClient>) -> Vec<OrderedFilter> {
    let streaming: Vec<MediaType> = config
        .streaming_media_types
        .iter()
        .filter_map(|raw| match raw.parse() {
            Ok(media) => Some(media),
            Err(e) => {
                tracing::warn!(media_type = %raw, error = %e, "Ignoring streaming media type");
                None
            }
        })
        .collect();
    let response_timeout = config.http_client.response_timeout_ms.map(Duration::from_millis);

    vec![
        OrderedFilter::new(WriteResponseFilter::ORDER, WriteResponseFilter::new(streaming)),
        OrderedFilter::new(RouteToRequestUrlFilter::ORDER, RouteToRequestUrlFilter),
        OrderedFilter::new(
            RoutingFilter::ORDER,
            RoutingFilter::new(client, headers::pipeline(&config.headers), response_timeout),
        ),
    ]
}
