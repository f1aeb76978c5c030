//! Route predicates.
//!
//! # Data Flow
//! ```text
//! route config (predicates = [...])
//!     → PredicateDefinition (shortcut, table, all/any/not)
//!     → registry.rs (name → factory, args validated)
//!     → matchers.rs (Path, Method, Header, Host, Query, Cookie)
//!     → And/Or/Not combinators
//!     → Arc<dyn AsyncPredicate> stored on the Route
//! ```
//!
//! # Design Decisions
//! - Predicates are pure functions of the exchange, shared immutably across requests
//! - Synchronous predicates are adapted explicitly with [`to_async`]; the adapter
//!   completes without suspending
//! - `And`/`Or` evaluate left to right and short-circuit
//! - Everything is built and validated at route-load time

pub mod matchers;
pub mod pattern;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::definition::{Definition, Registry};
use crate::error::ConfigurationError;
use crate::exchange::Exchange;

pub use registry::default_registry;

/// Predicate that decides without suspending.
pub trait Predicate: Send + Sync + fmt::Debug {
    fn test(&self, exchange: &Exchange) -> bool;
}

/// Predicate evaluated in the async model.
#[async_trait]
pub trait AsyncPredicate: Send + Sync + fmt::Debug {
    async fn apply(&self, exchange: &Exchange) -> bool;
}

/// Adapts a synchronous predicate to [`AsyncPredicate`].
#[derive(Debug)]
pub struct SyncPredicate<P>(pub P);

#[async_trait]
impl<P: Predicate> AsyncPredicate for SyncPredicate<P> {
    async fn apply(&self, exchange: &Exchange) -> bool {
        self.0.test(exchange)
    }
}

pub fn to_async<P: Predicate + 'static>(predicate: P) -> Arc<dyn AsyncPredicate> {
    Arc::new(SyncPredicate(predicate))
}

/// Matches every exchange. Used for routes without predicates.
#[derive(Debug, Clone, Copy)]
pub struct Always;

impl Predicate for Always {
    fn test(&self, _exchange: &Exchange) -> bool {
        true
    }
}

/// All inner predicates must pass.
#[derive(Debug)]
pub struct And(pub Vec<Arc<dyn AsyncPredicate>>);

#[async_trait]
impl AsyncPredicate for And {
    async fn apply(&self, exchange: &Exchange) -> bool {
        for predicate in &self.0 {
            if !predicate.apply(exchange).await {
                return false;
            }
        }
        true
    }
}

/// At least one inner predicate must pass.
#[derive(Debug)]
pub struct Or(pub Vec<Arc<dyn AsyncPredicate>>);

#[async_trait]
impl AsyncPredicate for Or {
    async fn apply(&self, exchange: &Exchange) -> bool {
        for predicate in &self.0 {
            if predicate.apply(exchange).await {
                return true;
            }
        }
        false
    }
}

#[derive(Debug)]
pub struct Not(pub Arc<dyn AsyncPredicate>);

#[async_trait]
impl AsyncPredicate for Not {
    async fn apply(&self, exchange: &Exchange) -> bool {
        !self.0.apply(exchange).await
    }
}

/// Predicate entry in a route's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateDefinition {
    All { all: Vec<PredicateDefinition> },
    Any { any: Vec<PredicateDefinition> },
    Not { not: Box<PredicateDefinition> },
    Single(Definition),
}

impl From<Definition> for PredicateDefinition {
    fn from(definition: Definition) -> Self {
        PredicateDefinition::Single(definition)
    }
}

pub type PredicateRegistry = Registry<Arc<dyn AsyncPredicate>>;

impl PredicateDefinition {
    pub fn build(&self, registry: &PredicateRegistry) -> Result<Arc<dyn AsyncPredicate>, ConfigurationError> {
        Ok(match self {
            PredicateDefinition::Single(definition) => registry.build(definition)?,
            PredicateDefinition::All { all } => Arc::new(And(build_each(all, registry)?)),
            PredicateDefinition::Any { any } => Arc::new(Or(build_each(any, registry)?)),
            PredicateDefinition::Not { not } => Arc::new(Not(not.build(registry)?)),
        })
    }
}

fn build_each(
    definitions: &[PredicateDefinition],
    registry: &PredicateRegistry,
) -> Result<Vec<Arc<dyn AsyncPredicate>>, ConfigurationError> {
    definitions.iter().map(|d| d.build(registry)).collect()
}

/// Builds a route's predicate list; the entries are ANDed.
pub fn build_route_predicate(
    definitions: &[PredicateDefinition],
    registry: &PredicateRegistry,
) -> Result<Arc<dyn AsyncPredicate>, ConfigurationError> {
    let mut predicates = build_each(definitions, registry)?;
    Ok(match predicates.len() {
        0 => to_async(Always),
        1 => predicates.remove(0),
        _ => Arc::new(And(predicates)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::testing::exchange;
    use axum::http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counting {
        result: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Predicate for Counting {
        fn test(&self, _exchange: &Exchange) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    fn counting(result: bool) -> (Arc<dyn AsyncPredicate>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            to_async(Counting {
                result,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn test_and_short_circuits() {
        let (first, _) = counting(false);
        let (second, second_calls) = counting(true);
        let and = And(vec![first, second]);
        assert!(!and.apply(&exchange(Method::GET, "/")).await);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_or_short_circuits() {
        let (first, _) = counting(true);
        let (second, second_calls) = counting(false);
        let or = Or(vec![first, second]);
        assert!(or.apply(&exchange(Method::GET, "/")).await);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_not_inverts() {
        let (inner, _) = counting(true);
        assert!(!Not(inner).apply(&exchange(Method::GET, "/")).await);
    }

    #[tokio::test]
    async fn test_build_combinators_from_toml() {
        #[derive(Deserialize)]
        struct Holder {
            predicates: Vec<PredicateDefinition>,
        }
        let holder: Holder = toml::from_str(
            r#"
            predicates = [
                "Path=/api/**",
                { any = ["Method=GET", "Method=HEAD"] },
                { not = "Header=X-Block" },
            ]
            "#,
        )
        .unwrap();

        let registry = default_registry();
        let predicate = build_route_predicate(&holder.predicates, &registry).unwrap();

        assert!(predicate.apply(&exchange(Method::GET, "/api/items")).await);
        assert!(!predicate.apply(&exchange(Method::POST, "/api/items")).await);
        assert!(!predicate.apply(&exchange(Method::GET, "/other")).await);
    }

    #[test]
    fn test_unknown_predicate_fails_at_build() {
        let definition: PredicateDefinition = Definition::named("Weekday", [("day", "MON")]).into();
        let err = definition.build(&default_registry()).unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownPredicate("Weekday".into()));
    }
}
