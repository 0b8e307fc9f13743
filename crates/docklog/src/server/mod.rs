//! HTTP surface: the WebSocket duplex endpoint plus small read-only routes
//! for health, containers, SQL aggregates, and diagnostic counters.

pub mod wire;
pub mod ws;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, put},
    Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .route("/api/containers", get(containers))
        .route("/api/containers/{id}/retention", put(set_retention))
        .route("/api/metrics", get(metrics))
        .route("/api/requests/{request_id}/queries", get(request_queries))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "containers": state.inventory.len(),
        "stored_messages": state.store.len(),
        "subscribers": state.hub.subscriber_count(),
        "sql_scopes": state.sql.scope_count(),
    }))
}

async fn containers(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.container_snapshot())
}

async fn metrics(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

async fn set_retention(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(policy): Json<crate::store::RetentionPolicy>,
) -> impl IntoResponse {
    state.store.set_retention(&id, policy);
    StatusCode::NO_CONTENT
}

async fn request_queries(
    State(state): State<SharedState>,
    Path(request_id): Path<String>,
) -> impl IntoResponse {
    let reports = state.sql.report(&request_id);
    if reports.is_empty() {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "unknown request id"})))
            .into_response();
    }
    Json(reports).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::docker::fake::FakeSource;
    use crate::state::AppState;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_router_builds() {
        let state = AppState::new(Arc::new(FakeSource::new()), MonitorConfig::default());
        let _router = build_router(state);
    }
}
