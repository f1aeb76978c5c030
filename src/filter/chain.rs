//! Continuation passed to each filter.

use crate::error::GatewayError;
use crate::exchange::{ChainState, Exchange};
use crate::filter::OrderedFilter;

/// The rest of the sorted filter chain.
///
/// `proceed` consumes the chain, so a filter can run its successors at most once.
#[derive(Debug)]
pub struct Chain<'a> {
    filters: &'a [OrderedFilter],
    index: usize,
}

impl<'a> Chain<'a> {
    pub fn new(filters: &'a [OrderedFilter]) -> Self {
        Self { filters, index: 0 }
    }

    /// Position of the next filter in the sorted chain.
    pub fn position(&self) -> usize {
        self.index
    }

    pub fn is_exhausted(&self) -> bool {
        self.index >= self.filters.len()
    }

    /// Runs the remaining filters. Completes once every one of them has finished
    /// its post-work.
    pub async fn proceed(self, exchange: &mut Exchange) -> Result<(), GatewayError> {
        let Some(current) = self.filters.get(self.index) else {
            return Ok(());
        };
        exchange.set_state(ChainState::Running(self.index));
        let next = Chain {
            filters: self.filters,
            index: self.index + 1,
        };
        current.filter.filter(exchange, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::testing::exchange;
    use crate::filter::testing::recording;
    use crate::filter::{GatewayFilter, OrderedFilter};
    use async_trait::async_trait;
    use axum::http::{Method, StatusCode};
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct ShortCircuit;

    #[async_trait]
    impl GatewayFilter for ShortCircuit {
        async fn filter(&self, exchange: &mut Exchange, _chain: Chain<'_>) -> Result<(), GatewayError> {
            exchange.response.set_status(StatusCode::FORBIDDEN);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Failing;

    #[async_trait]
    impl GatewayFilter for Failing {
        async fn filter(&self, _exchange: &mut Exchange, _chain: Chain<'_>) -> Result<(), GatewayError> {
            Err(GatewayError::UpstreamConnect("refused".into()))
        }
    }

    #[tokio::test]
    async fn test_pre_ascending_post_descending() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let filters = vec![recording(1, "a", &log), recording(2, "b", &log), recording(3, "c", &log)];
        let mut exchange = exchange(Method::GET, "/");

        Chain::new(&filters).proceed(&mut exchange).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["pre:a", "pre:b", "pre:c", "post:c", "post:b", "post:a"]
        );
        assert_eq!(exchange.state(), ChainState::Running(2));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let filters = vec![
            recording(1, "outer", &log),
            OrderedFilter::new(2, ShortCircuit),
            recording(3, "never", &log),
        ];
        let mut exchange = exchange(Method::GET, "/");

        Chain::new(&filters).proceed(&mut exchange).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["pre:outer", "post:outer"]);
        assert_eq!(exchange.response.status(), Some(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_failure_unwinds_through_entered_filters() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let filters = vec![recording(1, "outer", &log), OrderedFilter::new(2, Failing)];
        let mut exchange = exchange(Method::GET, "/");

        let err = Chain::new(&filters).proceed(&mut exchange).await.unwrap_err();

        assert!(matches!(err, GatewayError::UpstreamConnect(_)));
        assert_eq!(*log.lock().unwrap(), vec!["pre:outer", "post:outer"]);
    }

    #[test]
    fn test_empty_chain_is_exhausted() {
        let chain = Chain::new(&[]);
        assert!(chain.is_exhausted());
        assert_eq!(chain.position(), 0);
    }
}
