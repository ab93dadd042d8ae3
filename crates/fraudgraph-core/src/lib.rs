//! # fraudgraph-core
//!
//! Typed property graph for fraud-pattern analysis.
//!
//! Tabular rows go through the identifier resolver into atomic batches; the
//! query engine answers seven fixed fraud-pattern shapes over read-only views.
//!
//! ## Architectural Constraints
//!
//! - Edge loading only looks handles up; node loading is the only allocator
//! - Every mutation is a batch commit, visible entirely or not at all
//! - Forward and reverse adjacency are updated in the same commit
//! - No async, no network dependencies

// =============================================================================
// MODULES
// =============================================================================

pub mod batch;
pub mod engine;
pub mod formats;
pub mod geo;
pub mod graph;
pub mod loader;
pub mod primitives;
pub mod query;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod system;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use geo::GeoPoint;
pub use types::{
    AccountAttrs, AttrPredicate, AttrValue, DeviceAttrs, Direction, DocumentAttrs, Edge,
    EdgeLabel, FraudGraphError, Handle, IpAttrs, Node, NodeAttributes, NodeKind,
    TransactionAttrs, TransformError, UserAttrs,
};

// =============================================================================
// RE-EXPORTS: Graph, Loader & Queries
// =============================================================================

pub use batch::{Batch, CommitReceipt};
pub use engine::QueryEngine;
pub use graph::{Graph, GraphRead, GraphStore, MemoryStore, Neighbors, SerializableGraph};
pub use loader::{
    BulkLoader, Dataset, EdgeSource, EdgeSpec, FlowColumns, FlowSource, LoadReport, LoadSummary,
    LoaderOptions, NodeSource, SourceRow,
};
pub use query::{Query, QueryResult};
pub use resolver::Resolver;
pub use session::Session;
pub use storage::RedbGraph;

// =============================================================================
// RE-EXPORTS: Formats & System
// =============================================================================

pub use formats::{PersistenceHeader, graph_from_bytes, graph_to_bytes};
pub use system::GraphMetrics;
