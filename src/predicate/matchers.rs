//! Request matchers.
//!
//! # Responsibilities
//! - Match path patterns (`*`, `**`, `{var}`)
//! - Match method, header, host, query parameter and cookie
//!
//! # Design Decisions
//! - Host matching is case-insensitive and ignores the port
//! - Path matching is case-sensitive
//! - A header/query/cookie matcher without a regexp only checks presence
//! - Regexps must match the whole value

use axum::http::{header, Method};
use regex::Regex;

use crate::exchange::Exchange;
use crate::predicate::pattern::Pattern;
use crate::predicate::Predicate;

/// Matches the request path against one or more patterns.
#[derive(Debug, Clone)]
pub struct PathPredicate {
    patterns: Vec<Pattern>,
    match_trailing_slash: bool,
}

impl PathPredicate {
    pub fn new<I, S>(patterns: I, match_trailing_slash: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns.into_iter().map(|p| Pattern::path(p.as_ref())).collect(),
            match_trailing_slash,
        }
    }
}

impl Predicate for PathPredicate {
    fn test(&self, exchange: &Exchange) -> bool {
        let path = exchange.uri().path();
        self.patterns.iter().any(|pattern| {
            if pattern.matches(path) {
                return true;
            }
            self.match_trailing_slash
                && path.len() > 1
                && !pattern.ends_with_separator()
                && path
                    .strip_suffix('/')
                    .is_some_and(|trimmed| pattern.matches(trimmed))
        })
    }
}

/// Matches the request method.
#[derive(Debug, Clone)]
pub struct MethodPredicate {
    methods: Vec<Method>,
}

impl MethodPredicate {
    pub fn new(methods: Vec<Method>) -> Self {
        Self { methods }
    }
}

impl Predicate for MethodPredicate {
    fn test(&self, exchange: &Exchange) -> bool {
        self.methods.contains(exchange.method())
    }
}

/// Matches a request header, optionally against a regexp.
#[derive(Debug, Clone)]
pub struct HeaderPredicate {
    name: String,
    regexp: Option<Regex>,
}

impl HeaderPredicate {
    pub fn new(name: impl Into<String>, regexp: Option<Regex>) -> Self {
        Self {
            name: name.into(),
            regexp,
        }
    }
}

impl Predicate for HeaderPredicate {
    fn test(&self, exchange: &Exchange) -> bool {
        let mut values = exchange.request_headers().get_all(self.name.as_str()).iter().peekable();
        match &self.regexp {
            None => values.peek().is_some(),
            Some(regexp) => values
                .filter_map(|v| v.to_str().ok())
                .any(|v| regexp.is_match(v)),
        }
    }
}

/// Matches the `Host` header (or the URI authority) against host patterns.
#[derive(Debug, Clone)]
pub struct HostPredicate {
    patterns: Vec<Pattern>,
}

impl HostPredicate {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns.into_iter().map(|p| Pattern::host(p.as_ref())).collect(),
        }
    }
}

impl Predicate for HostPredicate {
    fn test(&self, exchange: &Exchange) -> bool {
        let host = exchange
            .request_headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| exchange.uri().host());
        let Some(host) = host else {
            return false;
        };
        let host = strip_port(host).to_ascii_lowercase();
        self.patterns.iter().any(|pattern| pattern.matches(&host))
    }
}

fn strip_port(host: &str) -> &str {
    // IPv6 literals keep their brackets
    if let Some(end) = host.find(']') {
        return &host[..=end];
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}

/// Matches a query parameter, optionally against a regexp.
#[derive(Debug, Clone)]
pub struct QueryPredicate {
    param: String,
    regexp: Option<Regex>,
}

impl QueryPredicate {
    pub fn new(param: impl Into<String>, regexp: Option<Regex>) -> Self {
        Self {
            param: param.into(),
            regexp,
        }
    }
}

impl Predicate for QueryPredicate {
    fn test(&self, exchange: &Exchange) -> bool {
        let Some(query) = exchange.uri().query() else {
            return false;
        };
        let mut values = url::form_urlencoded::parse(query.as_bytes())
            .filter(|(name, _)| name == self.param.as_str())
            .map(|(_, value)| value)
            .peekable();
        match &self.regexp {
            None => values.peek().is_some(),
            Some(regexp) => values.any(|v| regexp.is_match(&v)),
        }
    }
}

/// Matches a cookie value against a regexp.
#[derive(Debug, Clone)]
pub struct CookiePredicate {
    name: String,
    regexp: Regex,
}

impl CookiePredicate {
    pub fn new(name: impl Into<String>, regexp: Regex) -> Self {
        Self {
            name: name.into(),
            regexp,
        }
    }
}

impl Predicate for CookiePredicate {
    fn test(&self, exchange: &Exchange) -> bool {
        exchange
            .request_headers()
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, value)| name == self.name && self.regexp.is_match(value))
    }
}

/// Compiles a regexp anchored to the whole value.
pub fn anchored(regexp: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{regexp})$"))
}
