//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (exchange_id, route_id, connection_id)
//!
//! Consumers:
//!     → logging.rs subscriber (pretty or JSON lines on stdout)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Exchange ID flows through every event of a request
//! - `RUST_LOG` overrides the configured level

pub mod logging;

pub use logging::init_logging;
