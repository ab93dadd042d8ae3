//! # System Module
//!
//! Graph-wide metrics reported by `status` and the HTTP API.

mod metrics;

pub use metrics::GraphMetrics;
