//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all gateway handler
//! - Wire up middleware (tracing)
//! - Bind server to listener
//! - Turn each request into an Exchange and run it through the filter chain
//! - Swap the route table when a new configuration arrives
//!
//! # Design Decisions
//! - Errors raised before the response head is written become JSON error responses
//! - A client disconnect drops the handler future, which cancels the chain
//! - Reload rebuilds routes only; a bad config keeps the current table

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::client::{ClientError, HyperUpstreamClient, UpstreamClient};
use crate::config::GatewayConfig;
use crate::error::ConfigurationError;
use crate::exchange::Exchange;
use crate::handler::FilterChainHandler;
use crate::route::{RouteFactory, RouteTable};

/// Errors raised while constructing the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("upstream client: {0}")]
    Client(#[from] ClientError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<FilterChainHandler>,
}

/// HTTP front end of the gateway.
pub struct HttpServer {
    router: Router,
    routes: Arc<RouteTable>,
    factory: RouteFactory,
}

impl HttpServer {
    /// Create a server with the hyper upstream client.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let client = Arc::new(HyperUpstreamClient::new(&config.http_client)?);
        Ok(Self::with_client(config, client)?)
    }

    /// Create a server dispatching through `client`.
    pub fn with_client(config: GatewayConfig, client: Arc<dyn UpstreamClient>) -> Result<Self, ConfigurationError> {
        let factory = RouteFactory::default();
        let routes = Arc::new(RouteTable::new(factory.build_all(&config)?));
        tracing::info!(routes = routes.len(), "Routes loaded");

        let handler = Arc::new(FilterChainHandler::from_config(&config, Arc::clone(&routes), client));
        let router = Self::build_router(AppState { handler });

        Ok(Self {
            router,
            routes,
            factory,
        })
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// The live route table.
    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let routes = Arc::clone(&self.routes);
        let factory = self.factory;
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => reload_routes(&factory, &routes, &config),
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn reload_routes(factory: &RouteFactory, routes: &RouteTable, config: &GatewayConfig) {
    match factory.build_all(config) {
        Ok(built) => {
            let count = built.len();
            routes.replace(built);
            tracing::info!(routes = count, "Route table reloaded");
        }
        Err(e) => {
            tracing::error!(error = %e, "Rejected route reload, keeping current routes");
        }
    }
}

/// Catch-all handler: one exchange per request.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let mut exchange = Exchange::new(request, Some(addr));
    tracing::debug!(
        exchange_id = %exchange.id(),
        method = %exchange.method(),
        path = %exchange.uri().path(),
        "Handling exchange"
    );

    match state.handler.handle(&mut exchange).await {
        Ok(()) => exchange.into_response(),
        Err(e) => {
            tracing::debug!(exchange_id = %exchange.id(), status = %e.status_code(), "Responding with error");
            e.into_response()
        }
    }
}
