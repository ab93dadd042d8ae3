//! # API Endpoint Handlers
//!
//! Queries and exports read the store synchronously, so they run on the
//! blocking pool.

use super::{
    AppState,
    types::{ExportResponse, HealthResponse, QueryResponse, StatusResponse},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use fraudgraph_core::{FraudGraphError, Query, graph_to_bytes};

/// HTTP status for a core error: caller mistakes are 400, the rest 500.
pub(crate) fn error_status(error: &FraudGraphError) -> StatusCode {
    match error {
        FraudGraphError::QueryInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run `work` against the session on the blocking pool.
async fn with_session<T, F>(state: &AppState, work: F) -> Result<T, FraudGraphError>
where
    T: Send + 'static,
    F: FnOnce(&fraudgraph_core::Session) -> Result<T, FraudGraphError> + Send + 'static,
{
    let session = state.session.clone();
    tokio::task::spawn_blocking(move || work(&session))
        .await
        .map_err(|e| FraudGraphError::IoError(format!("worker failed: {}", e)))?
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let backend = if state.session.is_persistent() {
        "redb"
    } else {
        "memory"
    };

    match with_session(&state, |session| session.metrics()).await {
        Ok(metrics) => Ok(Json(StatusResponse {
            backend: backend.to_string(),
            metrics,
        })),
        Err(e) => {
            tracing::error!(error = %e, "status failed");
            Err((error_status(&e), Json(QueryResponse::error(e.to_string()))))
        }
    }
}

// =============================================================================
// QUERY HANDLER
// =============================================================================

/// Execute one fraud-pattern query. The body is a [`Query`] in JSON.
pub async fn query_handler(
    State(state): State<AppState>,
    body: Result<Json<Query>, JsonRejection>,
) -> impl IntoResponse {
    let query = match body {
        Ok(Json(query)) => query,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(QueryResponse::error(format!(
                    "invalid query input: {}",
                    rejection.body_text()
                ))),
            );
        }
    };

    let shape = query.shape();
    match with_session(&state, move |session| session.execute(&query)).await {
        Ok(result) => {
            tracing::debug!(shape, matches = result.len(), "query answered");
            (StatusCode::OK, Json(QueryResponse::from_result(result)))
        }
        Err(e) => {
            tracing::warn!(shape, error = %e, "query failed");
            (error_status(&e), Json(QueryResponse::error(e.to_string())))
        }
    }
}

// =============================================================================
// EXPORT HANDLER
// =============================================================================

/// Snapshot the committed graph as a base64 persistence blob.
pub async fn export_handler(State(state): State<AppState>) -> impl IntoResponse {
    let bytes = with_session(&state, |session| graph_to_bytes(&session.snapshot()?)).await;

    match bytes {
        Ok(bytes) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
            (
                StatusCode::OK,
                Json(ExportResponse::success(encoded, bytes.len())),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "export failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExportResponse::error(format!("Export failed: {}", e))),
            )
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
