//! Built-in predicate factories.

use std::str::FromStr;
use std::sync::Arc;

use axum::http::Method;

use crate::definition::{BoundArgs, FactoryKind, FactorySpec, Field, ShortcutType};
use crate::error::ConfigurationError;
use crate::predicate::matchers::{
    anchored, CookiePredicate, HeaderPredicate, HostPredicate, MethodPredicate, PathPredicate,
    QueryPredicate,
};
use crate::predicate::{to_async, AsyncPredicate, PredicateRegistry};

pub const PATH: FactorySpec = FactorySpec {
    name: "Path",
    fields: &[Field::required("patterns"), Field::optional("match_trailing_slash")],
    shortcut: ShortcutType::GatherList,
};

pub const METHOD: FactorySpec = FactorySpec {
    name: "Method",
    fields: &[Field::required("methods")],
    shortcut: ShortcutType::GatherList,
};

pub const HEADER: FactorySpec = FactorySpec {
    name: "Header",
    fields: &[Field::required("header"), Field::optional("regexp")],
    shortcut: ShortcutType::Default,
};

pub const HOST: FactorySpec = FactorySpec {
    name: "Host",
    fields: &[Field::required("patterns")],
    shortcut: ShortcutType::GatherList,
};

pub const QUERY: FactorySpec = FactorySpec {
    name: "Query",
    fields: &[Field::required("param"), Field::optional("regexp")],
    shortcut: ShortcutType::Default,
};

pub const COOKIE: FactorySpec = FactorySpec {
    name: "Cookie",
    fields: &[Field::required("name"), Field::required("regexp")],
    shortcut: ShortcutType::Default,
};

/// Registry with every built-in predicate factory.
pub fn default_registry() -> PredicateRegistry {
    let mut registry = PredicateRegistry::new(FactoryKind::Predicate);
    registry
        .register(PATH, build_path)
        .register(METHOD, build_method)
        .register(HEADER, build_header)
        .register(HOST, build_host)
        .register(QUERY, build_query)
        .register(COOKIE, build_cookie);
    registry
}

fn build_path(args: &BoundArgs) -> Result<Arc<dyn AsyncPredicate>, ConfigurationError> {
    let patterns = args.required_list("patterns")?;
    if let Some(bad) = patterns.iter().find(|p| !p.starts_with('/')) {
        return Err(args.invalid("patterns", format!("'{bad}' must start with '/'")));
    }
    let match_trailing_slash = args.parse_or("match_trailing_slash", true)?;
    Ok(to_async(PathPredicate::new(patterns, match_trailing_slash)))
}

fn build_method(args: &BoundArgs) -> Result<Arc<dyn AsyncPredicate>, ConfigurationError> {
    let methods = args
        .required_list("methods")?
        .iter()
        .map(|m| {
            Method::from_str(&m.to_ascii_uppercase())
                .map_err(|e| args.invalid("methods", format!("'{m}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(to_async(MethodPredicate::new(methods)))
}

fn build_header(args: &BoundArgs) -> Result<Arc<dyn AsyncPredicate>, ConfigurationError> {
    let header = args.required_str("header")?;
    axum::http::HeaderName::from_str(&header).map_err(|e| args.invalid("header", e.to_string()))?;
    let regexp = optional_regexp(args)?;
    Ok(to_async(HeaderPredicate::new(header, regexp)))
}

fn build_host(args: &BoundArgs) -> Result<Arc<dyn AsyncPredicate>, ConfigurationError> {
    let patterns = args.required_list("patterns")?;
    Ok(to_async(HostPredicate::new(patterns)))
}

fn build_query(args: &BoundArgs) -> Result<Arc<dyn AsyncPredicate>, ConfigurationError> {
    let param = args.required_str("param")?;
    let regexp = optional_regexp(args)?;
    Ok(to_async(QueryPredicate::new(param, regexp)))
}

fn build_cookie(args: &BoundArgs) -> Result<Arc<dyn AsyncPredicate>, ConfigurationError> {
    let name = args.required_str("name")?;
    let regexp = optional_regexp(args)?.ok_or_else(|| ConfigurationError::MissingArgument {
        factory: args.factory().to_string(),
        argument: "regexp".to_string(),
    })?;
    Ok(to_async(CookiePredicate::new(name, regexp)))
}

fn optional_regexp(args: &BoundArgs) -> Result<Option<regex::Regex>, ConfigurationError> {
    args.optional_str("regexp")
        .map(|raw| anchored(&raw).map_err(|e| args.invalid("regexp", e.to_string())))
        .transpose()
}
