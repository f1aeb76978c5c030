//! Gateway error taxonomy.
//!
//! # Responsibilities
//! - Classify every failure the filter chain can produce
//! - Map failures onto the single response the client receives
//!
//! # Design Decisions
//! - Configuration problems are raised while routes are built, not per request
//! - Streaming failures never produce a new response (the head is already sent)
//! - Illegal upstream status codes are environment problems and log at error level

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Invalid predicate, filter or route configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("unknown predicate: {0}")]
    UnknownPredicate(String),

    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    #[error("{factory}: missing argument '{argument}'")]
    MissingArgument { factory: String, argument: String },

    #[error("{factory}: invalid argument '{argument}': {reason}")]
    InvalidArgument {
        factory: String,
        argument: String,
        reason: String,
    },

    #[error("invalid shortcut definition: {0}")]
    InvalidShortcut(String),

    #[error("route '{route}': invalid uri: {reason}")]
    InvalidUri { route: String, reason: String },

    #[error("Invalid host: {0}")]
    InvalidHost(String),
}

/// Errors surfaced by the filter chain.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("no route matched {path}")]
    RoutingNotFound { path: String },

    #[error("upstream connection failed: {0}")]
    UpstreamConnect(String),

    #[error("Response took longer than timeout: {0:?}")]
    UpstreamTimeout(Duration),

    #[error("failed writing response body: {0}")]
    StreamingWrite(String),

    #[error("Unable to set status code on response: {0}")]
    IllegalStatusCode(u16),
}

impl GatewayError {
    /// Status code of the response this error resolves to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::RoutingNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::UpstreamConnect(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::StreamingWrite(_) => StatusCode::BAD_GATEWAY,
            GatewayError::IllegalStatusCode(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            GatewayError::Configuration(_) => "CONFIGURATION_ERROR",
            GatewayError::RoutingNotFound { .. } => "ROUTE_NOT_FOUND",
            GatewayError::UpstreamConnect(_) => "BAD_GATEWAY",
            GatewayError::UpstreamTimeout(_) => "GATEWAY_TIMEOUT",
            GatewayError::StreamingWrite(_) => "STREAMING_WRITE",
            GatewayError::IllegalStatusCode(_) => "ILLEGAL_STATUS_CODE",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));
        (self.status_code(), body).into_response()
    }
}
