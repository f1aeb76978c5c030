//! Ordered route table.
//!
//! # Responsibilities
//! - Keep routes sorted by ascending order
//! - Resolve the first route whose predicate passes
//! - Publish add/update/remove as atomic snapshots
//!
//! # Design Decisions
//! - Readers load one snapshot per lookup and never observe a partial update
//! - Predicates are evaluated strictly in order; a suspended predicate is
//!   awaited before the next route is tried
//! - Sorting is stable, so equal orders keep insertion order

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::exchange::Exchange;
use crate::route::Route;

type Snapshot = Vec<Arc<Route>>;

/// Read-mostly route table with atomic snapshot swaps.
#[derive(Debug)]
pub struct RouteTable {
    routes: ArcSwap<Snapshot>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes: ArcSwap::from_pointee(sorted(routes.into_iter().map(Arc::new).collect())),
        }
    }

    /// Current snapshot, in match order.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.routes.load_full()
    }

    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First route whose predicate passes.
    pub async fn lookup(&self, exchange: &Exchange) -> Option<Arc<Route>> {
        let snapshot = self.snapshot();
        for route in snapshot.iter() {
            if route.predicate.apply(exchange).await {
                tracing::debug!(
                    exchange_id = %exchange.id(),
                    route_id = %route.id,
                    path = %exchange.uri().path(),
                    "Route matched"
                );
                return Some(Arc::clone(route));
            }
        }
        None
    }

    /// Replaces every route.
    pub fn replace(&self, routes: Vec<Route>) {
        let count = routes.len();
        self.routes
            .store(Arc::new(sorted(routes.into_iter().map(Arc::new).collect())));
        tracing::info!(routes = count, "Route table replaced");
    }

    /// Adds a route, or replaces the one with the same id in place.
    pub fn upsert(&self, route: Route) {
        let route = Arc::new(route);
        self.routes.rcu(|current| {
            let mut next: Snapshot = current.iter().cloned().collect();
            match next.iter().position(|r| r.id == route.id) {
                Some(index) => next[index] = Arc::clone(&route),
                None => next.push(Arc::clone(&route)),
            }
            sorted(next)
        });
        tracing::info!(route_id = %route.id, "Route upserted");
    }

    /// Removes a route by id. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let previous = self.routes.rcu(|current| {
            current
                .iter()
                .filter(|r| r.id != id)
                .cloned()
                .collect::<Snapshot>()
        });
        let removed = previous.iter().any(|r| r.id == id);
        if removed {
            tracing::info!(route_id = %id, "Route removed");
        }
        removed
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn sorted(mut routes: Snapshot) -> Snapshot {
    routes.sort_by_key(|route| route.order);
    routes
}
