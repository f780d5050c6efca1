//! Account-scoped relay between browser tabs and an automation controller.
//!
//! Tabs connect as *inputs* and heartbeat their tab ids; a controller connects
//! as the *output* for the same account and injects commands, which are routed
//! to one live tab. Everything tabs send back is fanned out to the account's
//! outputs.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod config;
pub mod error;
mod handlers;
pub mod hub;
pub mod identity;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod session;
pub mod ws;

use crate::config::RelayConfig;
use crate::hub::ConnectionHub;
use crate::identity::ServerIdentity;
use crate::metrics::ServerMetrics;
use crate::registry::TabRegistry;
use crate::router::RelayRouter;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

/// Shared server state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RelayRouter>,
    pub metrics: Arc<ServerMetrics>,
    pub identity: Arc<ServerIdentity>,
    pub relay_config: Arc<RelayConfig>,
}

impl AppState {
    /// Wire registry, hub and router together for one server instance.
    pub fn new(relay_config: RelayConfig, identity: ServerIdentity) -> Self {
        let metrics = Arc::new(ServerMetrics::new());
        let registry = Arc::new(TabRegistry::new(relay_config.tab_ttl));
        let hub = Arc::new(ConnectionHub::new(metrics.clone()));
        let router = Arc::new(RelayRouter::new(registry, hub, metrics.clone()));
        Self {
            router,
            metrics,
            identity: Arc::new(identity),
            relay_config: Arc::new(relay_config),
        }
    }
}

/// HTTP surface: the relay socket plus health and metrics probes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(handlers::websocket_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
