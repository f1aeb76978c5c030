//! Built-in route filter factories.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};

use crate::definition::{BoundArgs, Definition, FactoryKind, FactorySpec, Field, Registry, ShortcutType};
use crate::error::ConfigurationError;
use crate::filter::factories::{
    AddRequestHeaderFilter, AddResponseHeaderFilter, PrefixPathFilter, PreserveHostHeaderFilter,
    RemoveRequestHeaderFilter, RemoveResponseHeaderFilter, SetStatusFilter, StripPrefixFilter,
};
use crate::filter::{GatewayFilter, OrderedFilter};

pub type FilterRegistry = Registry<Arc<dyn GatewayFilter>>;

const NAME_VALUE: &[Field] = &[Field::required("name"), Field::required("value")];
const NAME: &[Field] = &[Field::required("name")];

pub const ADD_REQUEST_HEADER: FactorySpec = FactorySpec {
    name: "AddRequestHeader",
    fields: NAME_VALUE,
    shortcut: ShortcutType::Default,
};

pub const ADD_RESPONSE_HEADER: FactorySpec = FactorySpec {
    name: "AddResponseHeader",
    fields: NAME_VALUE,
    shortcut: ShortcutType::Default,
};

pub const REMOVE_REQUEST_HEADER: FactorySpec = FactorySpec {
    name: "RemoveRequestHeader",
    fields: NAME,
    shortcut: ShortcutType::Default,
};

pub const REMOVE_RESPONSE_HEADER: FactorySpec = FactorySpec {
    name: "RemoveResponseHeader",
    fields: NAME,
    shortcut: ShortcutType::Default,
};

pub const SET_STATUS: FactorySpec = FactorySpec {
    name: "SetStatus",
    fields: &[Field::required("status")],
    shortcut: ShortcutType::Default,
};

pub const PRESERVE_HOST_HEADER: FactorySpec = FactorySpec {
    name: "PreserveHostHeader",
    fields: &[],
    shortcut: ShortcutType::Default,
};

pub const STRIP_PREFIX: FactorySpec = FactorySpec {
    name: "StripPrefix",
    fields: &[Field::required("parts")],
    shortcut: ShortcutType::Default,
};

pub const PREFIX_PATH: FactorySpec = FactorySpec {
    name: "PrefixPath",
    fields: &[Field::required("prefix")],
    shortcut: ShortcutType::Default,
};

/// Registry with every built-in route filter factory.
pub fn default_registry() -> FilterRegistry {
    let mut registry = FilterRegistry::new(FactoryKind::Filter);
    registry
        .register(ADD_REQUEST_HEADER, |args| {
            let (name, value) = header_pair(args)?;
            Ok(Arc::new(AddRequestHeaderFilter::new(name, value)))
        })
        .register(ADD_RESPONSE_HEADER, |args| {
            let (name, value) = header_pair(args)?;
            Ok(Arc::new(AddResponseHeaderFilter::new(name, value)))
        })
        .register(REMOVE_REQUEST_HEADER, |args| {
            Ok(Arc::new(RemoveRequestHeaderFilter::new(header_name(args)?)))
        })
        .register(REMOVE_RESPONSE_HEADER, |args| {
            Ok(Arc::new(RemoveResponseHeaderFilter::new(header_name(args)?)))
        })
        .register(SET_STATUS, build_set_status)
        .register(PRESERVE_HOST_HEADER, |_| Ok(Arc::new(PreserveHostHeaderFilter)))
        .register(STRIP_PREFIX, |args| {
            Ok(Arc::new(StripPrefixFilter::new(args.parse("parts")?)))
        })
        .register(PREFIX_PATH, |args| {
            let prefix = args.required_str("prefix")?;
            if !prefix.starts_with('/') {
                return Err(args.invalid("prefix", "must start with '/'"));
            }
            Ok(Arc::new(PrefixPathFilter::new(prefix)))
        });
    registry
}

/// Builds a filter list, numbering orders from 1 in declaration order.
pub fn build_ordered(
    registry: &FilterRegistry,
    definitions: &[Definition],
) -> Result<Vec<OrderedFilter>, ConfigurationError> {
    definitions
        .iter()
        .enumerate()
        .map(|(index, definition)| {
            Ok(OrderedFilter {
                order: index as i32 + 1,
                filter: registry.build(definition)?,
            })
        })
        .collect()
}

fn build_set_status(args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, ConfigurationError> {
    let raw = args.required_str("status")?;
    let status = match raw.parse::<u16>() {
        Ok(code) => StatusCode::from_u16(code).map_err(|e| args.invalid("status", e.to_string()))?,
        Err(_) => status_by_name(&raw).ok_or_else(|| args.invalid("status", format!("unknown status '{raw}'")))?,
    };
    Ok(Arc::new(SetStatusFilter::new(status)))
}

/// Looks a status up by reason phrase, e.g. `NOT_FOUND` or `not found`.
fn status_by_name(name: &str) -> Option<StatusCode> {
    let wanted = name.replace(['_', '-'], " ").to_ascii_lowercase();
    (100..=599u16)
        .filter_map(|code| StatusCode::from_u16(code).ok())
        .find(|status| {
            status
                .canonical_reason()
                .is_some_and(|reason| reason.to_ascii_lowercase().replace('-', " ") == wanted)
        })
}

fn header_name(args: &BoundArgs) -> Result<HeaderName, ConfigurationError> {
    let raw = args.required_str("name")?;
    HeaderName::from_bytes(raw.as_bytes()).map_err(|e| args.invalid("name", e.to_string()))
}

fn header_pair(args: &BoundArgs) -> Result<(HeaderName, HeaderValue), ConfigurationError> {
    let name = header_name(args)?;
    let raw = args.required_str("value")?;
    let value = HeaderValue::from_str(&raw).map_err(|e| args.invalid("value", e.to_string()))?;
    Ok((name, value))
}
