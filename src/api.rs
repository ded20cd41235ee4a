//! REST API server for the catalog agent
//!
//! Exposes the orchestrator over HTTP.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::agent::Orchestrator;
use crate::error::AgentError;
use crate::models::QueryRequest;

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// HTTP status a failed query is reported with.
pub fn status_for(error: &AgentError) -> StatusCode {
    match error {
        AgentError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AgentError::InvalidToolInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AgentError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        AgentError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AgentError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "model": state.orchestrator.model_name(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Query Endpoint
/// =============================

async fn query_agent(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!("Received query: {}", req.question);

    match state.orchestrator.run(req).await {
        Ok(reply) => (StatusCode::OK, Json(ApiResponse::success(reply))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!(status = status.as_u16(), "Query failed: {}", e);
            }
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// =============================
/// Session & Audit Endpoints
/// =============================

async fn clear_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    if state.orchestrator.sessions().clear(&session_id).await {
        (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id,
                "cleared": true,
            }))),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Unknown session: {}", session_id))),
        )
    }
}

async fn get_audit_record(
    State(state): State<ApiState>,
    Path(query_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.audit_log().get(query_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(ApiResponse::success(record))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Unknown query: {}", query_id))),
        ),
        Err(e) => (status_for(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/query_agent", post(query_agent))
        .route("/sessions/:session_id", delete(clear_session))
        .route("/audit/:query_id", get(get_audit_record))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }
}

/// Serve until `shutdown` resolves, then drop all conversation history.
pub async fn start_server<F>(
    orchestrator: Arc<Orchestrator>,
    port: u16,
    shutdown: F,
) -> std::result::Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(orchestrator.clone());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    orchestrator.sessions().clear_all().await;
    info!("API Server stopped");

    Ok(())
}
