//! Gateway filters.
//!
//! # Data Flow
//! ```text
//! global filters (write_response −1, rewrite 10000, dispatch i32::MAX)
//!   + route filters (default filters 1..n, route filters 1..n)
//!     → sort_by_order (stable; globals first on equal order)
//!     → chain.rs: each filter does pre-work, proceeds, then post-work
//!
//! pre-work  ascending:  WriteResponse → route filters → RouteToRequestUrl → Routing
//! post-work descending: Routing → RouteToRequestUrl → route filters → WriteResponse
//! ```
//!
//! # Design Decisions
//! - The filter trait has one operation; ordering lives in [`OrderedFilter`]
//! - Filters are immutable and shared by every request on the route
//! - A filter that does not proceed short-circuits the rest of the chain

pub mod chain;
pub mod dispatch;
pub mod factories;
pub mod registry;
pub mod rewrite;
pub mod write_response;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::exchange::Exchange;

pub use chain::Chain;
pub use dispatch::RoutingFilter;
pub use rewrite::RouteToRequestUrlFilter;
pub use write_response::WriteResponseFilter;

/// One stage of the filter chain.
#[async_trait]
pub trait GatewayFilter: Send + Sync + fmt::Debug {
    /// Runs this stage. Call `chain.proceed(exchange)` at most once to run the rest.
    async fn filter(&self, exchange: &mut Exchange, chain: Chain<'_>) -> Result<(), GatewayError>;
}

/// A filter paired with its position. Lower orders run their pre-work first.
#[derive(Debug, Clone)]
pub struct OrderedFilter {
    pub order: i32,
    pub filter: Arc<dyn GatewayFilter>,
}

impl OrderedFilter {
    pub fn new(order: i32, filter: impl GatewayFilter + 'static) -> Self {
        Self {
            order,
            filter: Arc::new(filter),
        }
    }
}

/// Stable sort by ascending order.
pub fn sort_by_order(filters: &mut [OrderedFilter]) {
    filters.sort_by_key(|f| f.order);
}

/// Global filters followed by route filters, sorted. Equal orders keep the
/// global filter first.
pub fn merge_filters(global: &[OrderedFilter], route: &[OrderedFilter]) -> Vec<OrderedFilter> {
    let mut merged = Vec::with_capacity(global.len() + route.len());
    merged.extend_from_slice(global);
    merged.extend_from_slice(route);
    sort_by_order(&mut merged);
    merged
}
