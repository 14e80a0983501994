//! Health and version endpoints
//!
//! Kubernetes-style probes: `/health` is liveness (200 while the
//! process runs), `/health/ready` is readiness (store reachable, or dev
//! mode). `/version` reports build provenance.

use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::routes::{full_body, json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse {
    healthy: bool,
    version: &'static str,
    timestamp: String,
    mode: &'static str,
    node_id: String,
    store: StoreHealth,
}

#[derive(Serialize)]
struct StoreHealth {
    connected: bool,
    backend: &'static str,
}

async fn build_health_response(state: &AppState) -> HealthResponse {
    let (connected, backend) = match &state.mongo {
        Some(mongo) => (mongo.ping().await.is_ok(), "mongodb"),
        None => (true, "memory"),
    };

    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        node_id: state.args.node_id.to_string(),
        store: StoreHealth { connected, backend },
    }
}

/// GET /health
pub async fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    let response = build_health_response(&state).await;
    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"healthy":true}"#.to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(full_body(body))
        .unwrap()
}

/// GET /health/ready
///
/// Ready when the store answers, or unconditionally in dev mode.
pub async fn readiness_check(state: Arc<AppState>) -> Response<BoxBody> {
    let response = build_health_response(&state).await;
    let is_ready = response.store.connected || state.args.dev_mode;

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"healthy":false}"#.to_string());
    let status = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(full_body(body))
        .unwrap()
}

/// GET /version
pub fn version_info() -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "commit": option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            "built_at": option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        }),
    )
}
