use axum::{
    Json,
    extract::{State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::metrics;
use crate::ws;

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.router.registry();

    Json(metrics::HealthStatus {
        status: "healthy".to_string(),
        connections: state.router.hub().connection_count().await as u64,
        registry: metrics::RegistryHealth {
            accounts: registry.account_count().await as u64,
            stored_tabs: registry.entry_count().await as u64,
            tab_ttl_secs: registry.ttl().as_secs(),
        },
        uptime_secs: state.metrics.uptime_secs(),
        fingerprint: state.identity.fingerprint(),
    })
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Relay WebSocket upgrade
pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let capacity = state.relay_config.send_channel_capacity;
    ws.on_upgrade(move |socket| {
        ws::handle_relay_ws(
            socket,
            state.router.clone(),
            state.identity.clone(),
            state.metrics.clone(),
            capacity,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::identity::ServerIdentity;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    async fn get_json(state: AppState, uri: &str) -> serde_json::Value {
        let resp = crate::build_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn test_state() -> AppState {
        AppState::new(RelayConfig::default(), ServerIdentity::generate())
    }

    #[tokio::test]
    async fn test_health_reports_registry_and_fingerprint() {
        let state = test_state();
        state
            .router
            .registry()
            .heartbeat("u1", &["t1".to_string(), "t2".to_string()])
            .await;

        let json = get_json(state.clone(), "/health").await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["registry"]["accounts"], 1);
        assert_eq!(json["registry"]["stored_tabs"], 2);
        assert_eq!(json["registry"]["tab_ttl_secs"], 60);
        assert_eq!(json["connections"], 0);
        assert_eq!(json["fingerprint"], state.identity.fingerprint());
    }

    #[tokio::test]
    async fn test_health_counts_hub_connections() {
        let state = test_state();
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        state.router.hub().register("c1", tx).await;

        let json = get_json(state, "/health").await;
        assert_eq!(json["connections"], 1);
    }

    #[tokio::test]
    async fn test_health_live() {
        let json = get_json(test_state(), "/health/live").await;
        assert_eq!(json["status"], "alive");
    }

    #[tokio::test]
    async fn test_metrics_snapshot_shape() {
        let state = test_state();
        state.metrics.inject_rejected();
        let json = get_json(state, "/metrics").await;
        assert_eq!(json["connections"]["active"], 0);
        assert_eq!(json["routing"]["injects_rejected"], 1);
    }
}
