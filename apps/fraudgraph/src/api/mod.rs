//! # fraudgraph HTTP API Module
//!
//! REST API over the query engine, built with axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Node and edge counts per kind and label
//! - `POST /query` - Execute a fraud-pattern query (body: a `Query` tagged by `shape`)
//! - `POST /export` - Base64 snapshot of the committed graph
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `FRAUDGRAPH_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `FRAUDGRAPH_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `FRAUDGRAPH_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{API_KEY_ENV, ApiKey};
pub use middleware::{RATE_LIMIT_ENV, create_rate_limiter, get_rate_limit_from_env, parse_rate_limit};
pub use types::{ExportResponse, HealthResponse, QueryResponse, StatusResponse};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use fraudgraph_core::{FraudGraphError, Session};
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub const CORS_ORIGINS_ENV: &str = "FRAUDGRAPH_CORS_ORIGINS";

/// Largest accepted request body (2 MB).
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
///
/// `Session` is safe to share: queries and loads each work on their own
/// store view, so no outer lock is needed.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
}

impl AppState {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(session),
        }
    }
}

/// Authentication and rate limit settings for the router.
#[derive(Debug, Clone, Default)]
pub struct ApiSecurity {
    pub api_key: Option<ApiKey>,
    /// `None` disables rate limiting.
    pub rate_limit: Option<NonZeroU32>,
}

impl ApiSecurity {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_key: ApiKey::from_env(),
            rate_limit: get_rate_limit_from_env(),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// CORS from `FRAUDGRAPH_CORS_ORIGINS`: `*` allows all, a comma-separated
/// list allows those, anything else falls back to localhost only.
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var(CORS_ORIGINS_ENV).ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins ({}=*). This is insecure for production!",
                CORS_ORIGINS_ENV
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(hv) => {
                        tracing::info!("CORS: Allowing origin: {}", origin);
                        Some(hv)
                    }
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();

            if allowed.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in {}, defaulting to localhost only",
                    CORS_ORIGINS_ENV
                );
                build_localhost_cors()
            } else {
                cors_for(allowed)
            }
        }
        None => build_localhost_cors(),
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();
    cors_for(origins)
}

fn cors_for(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Router configured from the environment.
pub fn create_router(state: AppState) -> Router {
    create_router_with(state, ApiSecurity::from_env())
}

/// Router with explicit security settings.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit,
/// rate limiting, authentication.
pub fn create_router_with(state: AppState, security: ApiSecurity) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/query", post(handlers::query_handler))
        .route("/export", post(handlers::export_handler))
        .with_state(state);

    match security.api_key {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                key,
                auth::api_key_auth_middleware,
            ));
        }
        None => tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set {} to enable authentication.",
            API_KEY_ENV
        ),
    }

    match security.rate_limit {
        Some(rps) => {
            tracing::info!("Rate limiting enabled: {} requests/second", rps);
            router = router.layer(axum_middleware::from_fn_with_state(
                create_rate_limiter(rps),
                middleware::rate_limit_middleware,
            ));
        }
        None => tracing::info!("Rate limiting disabled"),
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

pub async fn run_server(addr: &str, session: Session) -> Result<(), FraudGraphError> {
    let router = create_router(AppState::new(session));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| FraudGraphError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("fraudgraph HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| FraudGraphError::IoError(format!("Server error: {}", e)))
}

/// Resolves on Ctrl+C. In-flight requests finish before the server exits.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => tracing::error!("cannot listen for shutdown signal: {}", e),
    }
}
