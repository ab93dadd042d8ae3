//! # API Request/Response Types
//!
//! JSON bodies of the HTTP API. Query requests are the core [`Query`] enum
//! itself, tagged by `shape`.

use fraudgraph_core::{GraphMetrics, QueryResult};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Graph counts plus the backend serving them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `"memory"` or `"redb"`.
    pub backend: String,
    #[serde(flatten)]
    pub metrics: GraphMetrics,
}

// =============================================================================
// QUERY RESPONSE
// =============================================================================

/// Outcome of `POST /query`.
///
/// `matched` is `false` for a well-formed query that found nothing; errors
/// carry `success: false` and a message instead of a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    #[must_use]
    pub fn from_result(result: QueryResult) -> Self {
        Self {
            success: true,
            matched: !result.is_empty(),
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            matched: false,
            result: None,
            error: Some(message.into()),
        }
    }
}

// =============================================================================
// EXPORT RESPONSE
// =============================================================================

/// Base64 snapshot of the committed graph, readable by `graph_from_bytes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub size_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportResponse {
    #[must_use]
    pub fn success(data: String, size_bytes: usize) -> Self {
        Self {
            success: true,
            data: Some(data),
            size_bytes,
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            size_bytes: 0,
            error: Some(message.into()),
        }
    }
}
