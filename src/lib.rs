//! Filter-chain API gateway library.

pub mod client;
pub mod config;
pub mod definition;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod handler;
pub mod headers;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod predicate;
pub mod route;

pub use config::schema::GatewayConfig;
pub use error::{ConfigurationError, GatewayError};
pub use exchange::Exchange;
pub use handler::FilterChainHandler;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
