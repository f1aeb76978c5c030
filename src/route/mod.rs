//! Routes and route construction.
//!
//! # Data Flow
//! ```text
//! [[routes]] in config (RouteDefinition)
//!     → RouteFactory::build
//!         → uri parsed + scheme prefix / lb host checked
//!         → predicates via the predicate registry (ANDed)
//!         → default_filters + route filters via the filter registry
//!     → Route (immutable)
//!     → table.rs (ordered snapshot, atomic swap on reload)
//! ```
//!
//! # Design Decisions
//! - Routes are immutable once published; a reload replaces them wholesale
//! - Every definition is validated here, so a bad route never reaches the table
//! - Lower `order` wins; equal orders keep declaration order

pub mod table;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::schema::{GatewayConfig, RouteDefinition};
use crate::definition::Definition;
use crate::error::ConfigurationError;
use crate::filter::registry::{self as filters, FilterRegistry};
use crate::filter::rewrite::resolve_route_uri;
use crate::filter::OrderedFilter;
use crate::predicate::{self, build_route_predicate, AsyncPredicate, PredicateRegistry};

pub use table::RouteTable;

/// A published route.
pub struct Route {
    pub id: String,
    /// Target URI; may carry a scheme prefix such as `lb:ws://service`.
    pub uri: Url,
    pub order: i32,
    pub predicate: Arc<dyn AsyncPredicate>,
    /// Default filters followed by the route's own, each list numbered from 1.
    pub filters: Vec<OrderedFilter>,
    /// Overrides the client-wide response timeout.
    pub response_timeout: Option<Duration>,
    /// Overrides the gateway-wide preserve-host flag.
    pub preserve_host: Option<bool>,
}

impl Route {
    /// Route with no predicate or filters.
    pub fn new(id: impl Into<String>, uri: Url) -> Self {
        Self {
            id: id.into(),
            uri,
            order: 0,
            predicate: predicate::to_async(predicate::Always),
            filters: Vec::new(),
            response_timeout: None,
            preserve_host: None,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_predicate(mut self, predicate: Arc<dyn AsyncPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_filters(mut self, filters: Vec<OrderedFilter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("uri", &self.uri.as_str())
            .field("order", &self.order)
            .field("predicate", &self.predicate)
            .field("filters", &self.filters)
            .finish()
    }
}

/// Builds routes from configuration through the predicate and filter registries.
#[derive(Debug)]
pub struct RouteFactory {
    predicates: PredicateRegistry,
    filters: FilterRegistry,
}

impl RouteFactory {
    pub fn new(predicates: PredicateRegistry, filters: FilterRegistry) -> Self {
        Self {
            predicates,
            filters,
        }
    }

    pub fn predicates(&self) -> &PredicateRegistry {
        &self.predicates
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Builds one route; `default_filters` are prepended to its filter list.
    pub fn build(
        &self,
        definition: &RouteDefinition,
        default_filters: &[Definition],
    ) -> Result<Route, ConfigurationError> {
        let uri = Url::parse(&definition.uri).map_err(|e| ConfigurationError::InvalidUri {
            route: definition.id.clone(),
            reason: e.to_string(),
        })?;
        resolve_route_uri(&uri)?;

        let predicate = build_route_predicate(&definition.predicates, &self.predicates)?;

        let mut ordered = filters::build_ordered(&self.filters, default_filters)?;
        ordered.extend(filters::build_ordered(&self.filters, &definition.filters)?);

        Ok(Route {
            id: definition.id.clone(),
            uri,
            order: definition.order,
            predicate,
            filters: ordered,
            response_timeout: definition.response_timeout_ms.map(Duration::from_millis),
            preserve_host: definition.preserve_host,
        })
    }

    /// Builds every route in the config. Fails on the first invalid route.
    pub fn build_all(&self, config: &GatewayConfig) -> Result<Vec<Route>, ConfigurationError> {
        config
            .routes
            .iter()
            .map(|definition| self.build(definition, &config.default_filters))
            .collect()
    }
}

impl Default for RouteFactory {
    fn default() -> Self {
        Self::new(predicate::default_registry(), filters::default_registry())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(uri: &str) -> RouteDefinition {
        RouteDefinition {
            id: "r1".into(),
            uri: uri.into(),
            order: 0,
            predicates: vec!["Path=/r1/**".parse::<Definition>().unwrap().into()],
            filters: vec!["StripPrefix=1".parse().unwrap()],
            response_timeout_ms: Some(250),
            preserve_host: None,
        }
    }

    #[test]
    fn test_build_route() {
        let defaults = vec!["AddResponseHeader=X-Gateway,filter-gateway".parse().unwrap()];
        let route = RouteFactory::default()
            .build(&definition("http://localhost:9000"), &defaults)
            .unwrap();
        assert_eq!(route.id, "r1");
        assert_eq!(route.response_timeout, Some(Duration::from_millis(250)));
        let orders: Vec<i32> = route.filters.iter().map(|f| f.order).collect();
        assert_eq!(orders, vec![1, 1]);
    }

    #[test]
    fn test_build_rejects_invalid_lb_host() {
        let err = RouteFactory::default()
            .build(&definition("lb://bad_host"), &[])
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidHost(_)));
    }

    #[test]
    fn test_build_rejects_unknown_filter() {
        let mut def = definition("http://localhost:9000");
        def.filters = vec!["Retry=3".parse().unwrap()];
        let err = RouteFactory::default().build(&def, &[]).unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownFilter("Retry".into()));
    }

    #[test]
    fn test_build_rejects_unparsable_uri() {
        let err = RouteFactory::default()
            .build(&definition("not a uri"), &[])
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidUri { .. }));
    }
}
