//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, wraps the request in an Exchange)
//!     → FilterChainHandler (route lookup, filter chain, upstream dispatch)
//!     → Exchange response (status, headers, streaming body)
//!     → Send to client
//! ```

pub mod server;

pub use server::{AppState, HttpServer, ServerError};
