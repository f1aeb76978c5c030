//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Build every route through the registries so unknown names and bad
//!   arguments are caught before the config is accepted
//! - Validate value ranges (timeouts > 0, parsable media types and addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::error::ConfigurationError;
use crate::filter::registry::build_ordered;
use crate::filter::write_response::MediaType;
use crate::route::RouteFactory;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(String),

    #[error("streaming media type '{0}' is invalid")]
    InvalidMediaType(String),

    #[error("default_filters: {0}")]
    DefaultFilter(ConfigurationError),

    #[error("route #{0} has an empty id")]
    EmptyRouteId(usize),

    #[error("duplicate route id '{0}'")]
    DuplicateRouteId(String),

    #[error("route '{id}': {source}")]
    Route {
        id: String,
        source: ConfigurationError,
    },
}

/// Validates a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    validate_with(config, &RouteFactory::default())
}

/// Validates against a specific set of registries.
pub fn validate_with(config: &GatewayConfig, factory: &RouteFactory) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }

    if config.http_client.connect_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("http_client.connect_timeout_ms".into()));
    }
    if config.http_client.response_timeout_ms == Some(0) {
        errors.push(ValidationError::ZeroTimeout("http_client.response_timeout_ms".into()));
    }

    for raw in &config.streaming_media_types {
        if raw.parse::<MediaType>().is_err() {
            errors.push(ValidationError::InvalidMediaType(raw.clone()));
        }
    }

    let defaults_valid = match build_ordered(factory.filters(), &config.default_filters) {
        Ok(_) => true,
        Err(e) => {
            errors.push(ValidationError::DefaultFilter(e));
            false
        }
    };

    let mut seen = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.id.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteId(index));
        } else if !seen.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRouteId(route.id.clone()));
        }

        if route.response_timeout_ms == Some(0) {
            errors.push(ValidationError::ZeroTimeout(format!("routes.{}.response_timeout_ms", route.id)));
        }

        // default filter errors are reported once above
        let defaults = if defaults_valid { config.default_filters.as_slice() } else { &[] };
        if let Err(source) = factory.build(route, defaults) {
            errors.push(ValidationError::Route {
                id: route.id.clone(),
                source,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteDefinition;

    fn route(id: &str, uri: &str) -> RouteDefinition {
        RouteDefinition {
            id: id.into(),
            uri: uri.into(),
            order: 0,
            predicates: Vec::new(),
            filters: Vec::new(),
            response_timeout_ms: None,
            preserve_host: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.http_client.response_timeout_ms = Some(0);
        config.streaming_media_types.push("garbage".into());
        config.routes = vec![
            route("a", "http://a"),
            route("a", "http://b"),
            route("", "http://c"),
            route("lb", "lb://bad_host"),
        ];

        let errors = validate_config(&config).unwrap_err();

        assert!(errors.contains(&ValidationError::InvalidBindAddress("nowhere".into())));
        assert!(errors.contains(&ValidationError::InvalidMediaType("garbage".into())));
        assert!(errors.contains(&ValidationError::DuplicateRouteId("a".into())));
        assert!(errors.contains(&ValidationError::EmptyRouteId(2)));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::Route { id, source: ConfigurationError::InvalidHost(_) } if id == "lb"
        )));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ZeroTimeout(_))));
    }

    #[test]
    fn test_unknown_names() {
        let mut config = GatewayConfig::default();
        config.default_filters = vec!["Bogus=1".parse().unwrap()];
        let mut r = route("r", "http://r");
        r.predicates = vec!["Weekday=MON".parse::<crate::definition::Definition>().unwrap().into()];
        config.routes = vec![r];

        let errors = validate_config(&config).unwrap_err();

        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::DefaultFilter(ConfigurationError::UnknownFilter(
            "Bogus".into()
        ))));
        assert!(errors.contains(&ValidationError::Route {
            id: "r".into(),
            source: ConfigurationError::UnknownPredicate("Weekday".into()),
        }));
    }
}
