//! # redb-backed Graph Storage
//!
//! A disk-backed graph store using the redb embedded database, providing:
//! - ACID transactions (one write transaction per batch)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (a query view is one read transaction, so it never observes a
//!   batch that has not committed)
//!
//! Forward and reverse adjacency live in separate tables keyed by
//! `(handle, label, handle)`; both are written in the same transaction.

use crate::batch::{Batch, CommitReceipt, check_endpoints};
use crate::graph::{GraphRead, GraphStore, Neighbors};
use crate::{Direction, Edge, EdgeLabel, FraudGraphError, Handle, Node, NodeKind};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition, WriteTransaction,
};
use std::path::Path;
use tracing::warn;

/// Table for nodes: Handle(u64) -> postcard-encoded Node
const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");

/// Table for the key index: (kind code, external key) -> Handle
const KEY_INDEX: TableDefinition<(u8, &str), u64> = TableDefinition::new("key_index");

/// Table for the kind index: (kind code, Handle) -> ()
const KIND_INDEX: TableDefinition<(u8, u64), ()> = TableDefinition::new("kind_index");

/// Forward adjacency: (from, label code, to) -> ()
const FORWARD: TableDefinition<(u64, u8, u64), ()> = TableDefinition::new("forward");

/// Reverse adjacency: (to, label code, from) -> ()
const REVERSE: TableDefinition<(u64, u8, u64), ()> = TableDefinition::new("reverse");

/// Edge count per label code
const LABEL_COUNTS: TableDefinition<u8, u64> = TableDefinition::new("label_counts");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_HANDLE: &str = "next_handle";

fn io_err(e: impl std::fmt::Display) -> FraudGraphError {
    FraudGraphError::IoError(e.to_string())
}

/// A disk-backed graph store using redb.
pub struct RedbGraph {
    db: Database,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph").finish_non_exhaustive()
    }
}

impl RedbGraph {
    /// Open or create a graph database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FraudGraphError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(io_err)?;
        {
            write_txn.open_table(NODES).map_err(io_err)?;
            write_txn.open_table(KEY_INDEX).map_err(io_err)?;
            write_txn.open_table(KIND_INDEX).map_err(io_err)?;
            write_txn.open_table(FORWARD).map_err(io_err)?;
            write_txn.open_table(REVERSE).map_err(io_err)?;
            write_txn.open_table(LABEL_COUNTS).map_err(io_err)?;
            write_txn.open_table(METADATA).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        Ok(Self { db })
    }
}

// =============================================================================
// BATCH COMMIT
// =============================================================================

fn write_batch(txn: &WriteTransaction, batch: &Batch) -> Result<CommitReceipt, FraudGraphError> {
    let mut nodes = txn.open_table(NODES).map_err(io_err)?;
    let mut key_index = txn.open_table(KEY_INDEX).map_err(io_err)?;
    let mut kind_index = txn.open_table(KIND_INDEX).map_err(io_err)?;
    let mut forward = txn.open_table(FORWARD).map_err(io_err)?;
    let mut reverse = txn.open_table(REVERSE).map_err(io_err)?;
    let mut label_counts = txn.open_table(LABEL_COUNTS).map_err(io_err)?;
    let mut metadata = txn.open_table(METADATA).map_err(io_err)?;

    let mut next_handle = metadata
        .get(NEXT_HANDLE)
        .map_err(io_err)?
        .map(|v| v.value())
        .unwrap_or(0);
    let mut receipt = CommitReceipt::default();

    // Pass 1: node upserts.
    for node in batch.nodes() {
        let kind = node.kind();

        let existing: Option<Node> = match nodes.get(node.handle.0).map_err(io_err)? {
            Some(data) => Some(
                postcard::from_bytes(data.value())
                    .map_err(|e| FraudGraphError::DeserializationError(e.to_string()))?,
            ),
            None => None,
        };
        if let Some(existing) = existing {
            if existing.kind() != kind || existing.key != node.key {
                return Err(FraudGraphError::Conflict(format!(
                    "{} holds {} {:?}, not {} {:?}",
                    node.handle,
                    existing.kind(),
                    existing.key,
                    kind,
                    node.key
                )));
            }
        }

        let owner = key_index
            .get((kind.code(), node.key.as_str()))
            .map_err(io_err)?
            .map(|v| v.value());
        if let Some(owner) = owner.filter(|owner| *owner != node.handle.0) {
            return Err(FraudGraphError::Conflict(format!(
                "{kind} key {:?} already belongs to {}",
                node.key,
                Handle(owner)
            )));
        }

        let bytes = postcard::to_allocvec(node)
            .map_err(|e| FraudGraphError::SerializationError(e.to_string()))?;
        nodes
            .insert(node.handle.0, bytes.as_slice())
            .map_err(io_err)?;
        key_index
            .insert((kind.code(), node.key.as_str()), node.handle.0)
            .map_err(io_err)?;
        kind_index
            .insert((kind.code(), node.handle.0), ())
            .map_err(io_err)?;

        next_handle = next_handle.max(node.handle.0.saturating_add(1));
        receipt.nodes_written += 1;
    }

    // Kind of a handle as this transaction sees it. Nodes staged by pass 1
    // are already in the tables.
    let stored_kind =
        |handle: Handle, expected: NodeKind| -> Result<Option<NodeKind>, FraudGraphError> {
        if kind_index
            .get((expected.code(), handle.0))
            .map_err(io_err)?
            .is_some()
        {
            return Ok(Some(expected));
        }
        match nodes.get(handle.0).map_err(io_err)? {
            Some(data) => {
                let node: Node = postcard::from_bytes(data.value())
                    .map_err(|e| FraudGraphError::DeserializationError(e.to_string()))?;
                Ok(Some(node.kind()))
            }
            None => Ok(None),
        }
    };

    // Pass 2: edge inserts, both directions.
    for edge in batch.edges() {
        let (want_from, want_to) = edge.label.endpoints();
        let from_kind = stored_kind(edge.from, want_from)?;
        let to_kind = stored_kind(edge.to, want_to)?;
        check_endpoints(edge, from_kind, to_kind)?;

        let label = edge.label.code();
        let existed = forward
            .insert((edge.from.0, label, edge.to.0), ())
            .map_err(io_err)?
            .is_some();
        if existed {
            receipt.edges_existing += 1;
            continue;
        }
        reverse
            .insert((edge.to.0, label, edge.from.0), ())
            .map_err(io_err)?;
        let count = label_counts
            .get(label)
            .map_err(io_err)?
            .map(|v| v.value())
            .unwrap_or(0);
        label_counts
            .insert(label, count.saturating_add(1))
            .map_err(io_err)?;
        receipt.edges_inserted += 1;
    }

    metadata.insert(NEXT_HANDLE, next_handle).map_err(io_err)?;
    Ok(receipt)
}

// =============================================================================
// GRAPHSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl GraphStore for RedbGraph {
    type View<'a> = RedbView;

    fn view(&self) -> Result<RedbView, FraudGraphError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        Ok(RedbView { txn })
    }

    fn commit(&self, batch: &Batch) -> Result<CommitReceipt, FraudGraphError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| FraudGraphError::BatchCommit(e.to_string()))?;

        match write_batch(&txn, batch) {
            Ok(receipt) => {
                txn.commit()
                    .map_err(|e| FraudGraphError::BatchCommit(e.to_string()))?;
                Ok(receipt)
            }
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    warn!(error = %abort, "failed to abort rejected batch");
                }
                Err(e)
            }
        }
    }
}

/// A read transaction over a `RedbGraph`.
pub struct RedbView {
    txn: ReadTransaction,
}

impl std::fmt::Debug for RedbView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbView").finish_non_exhaustive()
    }
}

impl RedbView {
    fn adjacency(
        &self,
        handle: Handle,
        label: EdgeLabel,
        direction: Direction,
    ) -> Result<Vec<Handle>, FraudGraphError> {
        let table = match direction {
            Direction::Forward => self.txn.open_table(FORWARD),
            Direction::Reverse => self.txn.open_table(REVERSE),
        }
        .map_err(io_err)?;

        let code = label.code();
        let mut handles = Vec::new();
        for entry in table
            .range((handle.0, code, 0)..=(handle.0, code, u64::MAX))
            .map_err(io_err)?
        {
            let (key, _) = entry.map_err(io_err)?;
            handles.push(Handle(key.value().2));
        }
        Ok(handles)
    }
}

impl GraphRead for RedbView {
    fn node(&self, handle: Handle) -> Result<Option<Node>, FraudGraphError> {
        let table = self.txn.open_table(NODES).map_err(io_err)?;
        match table.get(handle.0).map_err(io_err)? {
            Some(data) => {
                let node: Node = postcard::from_bytes(data.value())
                    .map_err(|e| FraudGraphError::DeserializationError(e.to_string()))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    fn lookup_key(&self, kind: NodeKind, key: &str) -> Result<Option<Handle>, FraudGraphError> {
        let table = self.txn.open_table(KEY_INDEX).map_err(io_err)?;
        Ok(table
            .get((kind.code(), key))
            .map_err(io_err)?
            .map(|v| Handle(v.value())))
    }

    fn keys(&self, kind: NodeKind) -> Result<Vec<(String, Handle)>, FraudGraphError> {
        let table = self.txn.open_table(KEY_INDEX).map_err(io_err)?;
        let code = kind.code();
        let mut keys = Vec::new();
        for entry in table.range((code, "")..).map_err(io_err)? {
            let (key, value) = entry.map_err(io_err)?;
            let (entry_code, external) = key.value();
            if entry_code != code {
                break;
            }
            keys.push((external.to_string(), Handle(value.value())));
        }
        Ok(keys)
    }

    fn next_handle(&self) -> Result<u64, FraudGraphError> {
        let table = self.txn.open_table(METADATA).map_err(io_err)?;
        Ok(table
            .get(NEXT_HANDLE)
            .map_err(io_err)?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    fn scan(&self, kind: NodeKind) -> Result<Vec<Node>, FraudGraphError> {
        let kinds = self.txn.open_table(KIND_INDEX).map_err(io_err)?;
        let nodes = self.txn.open_table(NODES).map_err(io_err)?;
        let code = kind.code();

        let mut out = Vec::new();
        for entry in kinds
            .range((code, 0)..=(code, u64::MAX))
            .map_err(io_err)?
        {
            let (key, _) = entry.map_err(io_err)?;
            let handle = key.value().1;
            let Some(data) = nodes.get(handle).map_err(io_err)? else {
                warn!(handle, %kind, "kind index points at a missing node");
                continue;
            };
            match postcard::from_bytes::<Node>(data.value()) {
                Ok(node) => out.push(node),
                Err(e) => warn!(handle, %kind, error = %e, "skipping undecodable node"),
            }
        }
        Ok(out)
    }

    fn neighbors(
        &self,
        handle: Handle,
        label: EdgeLabel,
        direction: Direction,
    ) -> Result<Neighbors<'_>, FraudGraphError> {
        // Materialized, not lazy.
        Ok(Neighbors::from_vec(self.adjacency(handle, label, direction)?))
    }

    fn count_neighbors(
        &self,
        handle: Handle,
        label: EdgeLabel,
        direction: Direction,
    ) -> Result<usize, FraudGraphError> {
        let table = match direction {
            Direction::Forward => self.txn.open_table(FORWARD),
            Direction::Reverse => self.txn.open_table(REVERSE),
        }
        .map_err(io_err)?;
        let code = label.code();
        Ok(table
            .range((handle.0, code, 0)..=(handle.0, code, u64::MAX))
            .map_err(io_err)?
            .count())
    }

    fn contains_edge(&self, edge: &Edge) -> Result<bool, FraudGraphError> {
        let table = self.txn.open_table(FORWARD).map_err(io_err)?;
        Ok(table
            .get((edge.from.0, edge.label.code(), edge.to.0))
            .map_err(io_err)?
            .is_some())
    }

    fn node_count(&self) -> Result<usize, FraudGraphError> {
        let table = self.txn.open_table(NODES).map_err(io_err)?;
        Ok(table.len().map_err(io_err)? as usize)
    }

    fn edge_count(&self) -> Result<usize, FraudGraphError> {
        let table = self.txn.open_table(FORWARD).map_err(io_err)?;
        Ok(table.len().map_err(io_err)? as usize)
    }

    fn count_kind(&self, kind: NodeKind) -> Result<usize, FraudGraphError> {
        let table = self.txn.open_table(KIND_INDEX).map_err(io_err)?;
        let code = kind.code();
        Ok(table
            .range((code, 0)..=(code, u64::MAX))
            .map_err(io_err)?
            .count())
    }

    fn count_label(&self, label: EdgeLabel) -> Result<usize, FraudGraphError> {
        let table = self.txn.open_table(LABEL_COUNTS).map_err(io_err)?;
        Ok(table
            .get(label.code())
            .map_err(io_err)?
            .map(|v| v.value() as usize)
            .unwrap_or(0))
    }
}

// =============================================================================
// TESTS
// =============================================================================
