//! # Session Module
//!
//! One entry point over either storage backend.
//!
//! ## Storage Backends
//!
//! - `InMemory`: a `MemoryStore` (fast, volatile unless saved as a snapshot)
//! - `Persistent`: a `RedbGraph` (disk-backed, one redb transaction per batch)

use crate::batch::{Batch, CommitReceipt};
use crate::engine::QueryEngine;
use crate::graph::{Graph, GraphStore, MemoryStore};
use crate::loader::{BulkLoader, Dataset, LoadReport, LoaderOptions};
use crate::query::{Query, QueryResult};
use crate::storage::RedbGraph;
use crate::system::GraphMetrics;
use crate::FraudGraphError;
use std::path::Path;

/// Storage backend for a Session.
#[derive(Debug)]
enum StorageBackend {
    /// In-memory graph (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed graph using redb.
    Persistent(RedbGraph),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

/// A store plus the loader settings used for it.
///
/// Every method takes `&self`: queries run concurrently with each other and
/// with loads, isolated by the backend's views.
#[derive(Debug, Default)]
pub struct Session {
    backend: StorageBackend,
    options: LoaderOptions,
}

impl Session {
    /// Create a new empty session with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session around an existing in-memory graph.
    #[must_use]
    pub fn with_graph(graph: Graph) -> Self {
        Self {
            backend: StorageBackend::InMemory(MemoryStore::with_graph(graph)),
            options: LoaderOptions::default(),
        }
    }

    /// Open or create a redb database at `path`.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, FraudGraphError> {
        Ok(Self::with_redb_graph(RedbGraph::open(path)?))
    }

    #[must_use]
    pub fn with_redb_graph(redb: RedbGraph) -> Self {
        Self {
            backend: StorageBackend::Persistent(redb),
            options: LoaderOptions::default(),
        }
    }

    #[must_use]
    pub fn with_loader_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    // =========================================================================
    // LOADING
    // =========================================================================

    /// Load a dataset: every node source, then every edge source.
    pub fn load(&self, dataset: &Dataset) -> Result<LoadReport, FraudGraphError> {
        Ok(match &self.backend {
            StorageBackend::InMemory(store) => {
                BulkLoader::new(store, self.options)?.load_dataset(dataset)
            }
            StorageBackend::Persistent(store) => {
                BulkLoader::new(store, self.options)?.load_dataset(dataset)
            }
        })
    }

    /// Apply one batch atomically.
    pub fn commit(&self, batch: &Batch) -> Result<CommitReceipt, FraudGraphError> {
        match &self.backend {
            StorageBackend::InMemory(store) => store.commit(batch),
            StorageBackend::Persistent(store) => store.commit(batch),
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn execute(&self, query: &Query) -> Result<QueryResult, FraudGraphError> {
        match &self.backend {
            StorageBackend::InMemory(store) => QueryEngine::new(store).execute(query),
            StorageBackend::Persistent(store) => QueryEngine::new(store).execute(query),
        }
    }

    pub fn metrics(&self) -> Result<GraphMetrics, FraudGraphError> {
        match &self.backend {
            StorageBackend::InMemory(store) => GraphMetrics::collect(&store.view()?),
            StorageBackend::Persistent(store) => GraphMetrics::collect(&store.view()?),
        }
    }

    /// In-memory copy of the current committed state, for snapshot export.
    pub fn snapshot(&self) -> Result<Graph, FraudGraphError> {
        match &self.backend {
            StorageBackend::InMemory(store) => Ok(store.snapshot()),
            StorageBackend::Persistent(store) => Graph::from_view(&store.view()?),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
