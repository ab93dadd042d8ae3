//! # Graph Engine
//!
//! The node/edge store abstraction and its in-memory implementation.
//!
//! - `GraphRead` is a read-only view over committed state. Queries hold one
//!   view for their whole duration, so they never see half of a batch.
//! - `GraphStore` hands out views and applies `Batch`es atomically.
//! - `Graph` keeps forward and reverse adjacency per `(handle, label)` and
//!   updates both sides inside the same `apply` call.
//!
//! All data structures use `BTreeMap`/`BTreeSet` for deterministic ordering.

use crate::batch::{Batch, CommitReceipt, check_endpoints};
use crate::{AttrPredicate, AttrValue, Direction, Edge, EdgeLabel, FraudGraphError, Handle, Node, NodeKind};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, btree_set};
use tracing::warn;

// =============================================================================
// NEIGHBOR ITERATION
// =============================================================================

/// Lazily produced neighbor handles of one `(handle, label, direction)`.
///
/// The iterator is finite and `Clone`, so a caller can restart it by
/// keeping a copy before consuming.
///
/// Only the in-memory backend is lazy: it walks the adjacency set in place.
/// The redb backend reads the whole adjacency range into a list before
/// returning, since the range cannot outlive the table it borrows from.
#[derive(Debug, Clone)]
pub struct Neighbors<'a> {
    inner: NeighborsInner<'a>,
}

#[derive(Debug, Clone)]
enum NeighborsInner<'a> {
    Borrowed(btree_set::Iter<'a, Handle>),
    Owned(std::vec::IntoIter<Handle>),
}

impl<'a> Neighbors<'a> {
    #[must_use]
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Neighbors already materialized by the backend.
    #[must_use]
    pub fn from_vec(handles: Vec<Handle>) -> Self {
        Self {
            inner: NeighborsInner::Owned(handles.into_iter()),
        }
    }

    fn borrowed(iter: btree_set::Iter<'a, Handle>) -> Self {
        Self {
            inner: NeighborsInner::Borrowed(iter),
        }
    }
}

impl Iterator for Neighbors<'_> {
    type Item = Handle;

    fn next(&mut self) -> Option<Handle> {
        match &mut self.inner {
            NeighborsInner::Borrowed(iter) => iter.next().copied(),
            NeighborsInner::Owned(iter) => iter.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            NeighborsInner::Borrowed(iter) => iter.size_hint(),
            NeighborsInner::Owned(iter) => iter.size_hint(),
        }
    }
}

// =============================================================================
// GRAPHREAD / GRAPHSTORE TRAITS
// =============================================================================

/// Read-only access to one consistent state of the graph.
///
/// All fallible operations return `Result<T, FraudGraphError>` to support both
/// in-memory and persistent storage backends uniformly.
pub trait GraphRead {
    /// Get a node record by handle.
    fn node(&self, handle: Handle) -> Result<Option<Node>, FraudGraphError>;

    /// Resolve an external key through the store's key index.
    fn lookup_key(&self, kind: NodeKind, key: &str) -> Result<Option<Handle>, FraudGraphError>;

    /// Every `(key, handle)` of a kind, ordered by key.
    fn keys(&self, kind: NodeKind) -> Result<Vec<(String, Handle)>, FraudGraphError>;

    /// First handle value never used by a committed node.
    fn next_handle(&self) -> Result<u64, FraudGraphError>;

    /// All nodes of a kind, ordered by handle.
    fn scan(&self, kind: NodeKind) -> Result<Vec<Node>, FraudGraphError>;

    /// Neighbors of `handle` over `label` in the given direction.
    fn neighbors(
        &self,
        handle: Handle,
        label: EdgeLabel,
        direction: Direction,
    ) -> Result<Neighbors<'_>, FraudGraphError>;

    /// Degree of `handle` over `label`, without collecting the neighbor set.
    fn count_neighbors(
        &self,
        handle: Handle,
        label: EdgeLabel,
        direction: Direction,
    ) -> Result<usize, FraudGraphError>;

    fn contains_edge(&self, edge: &Edge) -> Result<bool, FraudGraphError>;

    fn node_count(&self) -> Result<usize, FraudGraphError>;

    fn edge_count(&self) -> Result<usize, FraudGraphError>;

    fn count_kind(&self, kind: NodeKind) -> Result<usize, FraudGraphError>;

    fn count_label(&self, label: EdgeLabel) -> Result<usize, FraudGraphError>;

    /// Point lookup by external key.
    fn find_by_key(&self, kind: NodeKind, key: &str) -> Result<Option<Node>, FraudGraphError> {
        match self.lookup_key(kind, key)? {
            Some(handle) => self.node(handle),
            None => Ok(None),
        }
    }

    /// Nodes of `kind` whose attribute `attr` satisfies `predicate`.
    ///
    /// An equality predicate on the key column goes through the key index;
    /// everything else is a scan. Values that cannot be compared are skipped
    /// and logged.
    fn find_by_attribute(
        &self,
        kind: NodeKind,
        attr: &str,
        predicate: &AttrPredicate,
    ) -> Result<Vec<Node>, FraudGraphError> {
        if !kind.attributes().contains(&attr) {
            return Err(FraudGraphError::QueryInput(format!(
                "{kind} has no attribute '{attr}'"
            )));
        }
        if attr == kind.key_column() {
            if let AttrPredicate::Equals(AttrValue::Text(key)) = predicate {
                return Ok(self.find_by_key(kind, key)?.into_iter().collect());
            }
        }
        Ok(self
            .scan(kind)?
            .into_iter()
            .filter(|node| attribute_matches(node, attr, predicate))
            .collect())
    }
}

/// Evaluate a predicate on one scanned node, logging malformed values.
pub(crate) fn attribute_matches(node: &Node, attr: &str, predicate: &AttrPredicate) -> bool {
    let Some(value) = node.attribute(attr) else {
        return false;
    };
    match predicate.evaluate(&value) {
        Some(hit) => hit,
        None => {
            warn!(
                handle = node.handle.0,
                kind = %node.kind(),
                key = %node.key,
                attribute = attr,
                "skipping node with malformed attribute"
            );
            false
        }
    }
}

/// A shared graph store: read views plus atomic batch commits.
pub trait GraphStore: Send + Sync {
    type View<'a>: GraphRead
    where
        Self: 'a;

    /// Open a read-only view of the current committed state.
    fn view(&self) -> Result<Self::View<'_>, FraudGraphError>;

    /// Apply a batch atomically. On error nothing from the batch is visible.
    fn commit(&self, batch: &Batch) -> Result<CommitReceipt, FraudGraphError>;
}

// =============================================================================
// GRAPH IMPLEMENTATION
// =============================================================================

/// The in-memory graph.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Node storage: Handle -> Node
    nodes: BTreeMap<Handle, Node>,

    /// Kind -> handles of that kind
    kind_index: BTreeMap<NodeKind, BTreeSet<Handle>>,

    /// Kind -> external key -> handle
    key_index: BTreeMap<NodeKind, BTreeMap<String, Handle>>,

    /// (from, label) -> targets
    forward: BTreeMap<(Handle, EdgeLabel), BTreeSet<Handle>>,

    /// (to, label) -> sources
    reverse: BTreeMap<(Handle, EdgeLabel), BTreeSet<Handle>>,

    label_counts: BTreeMap<EdgeLabel, usize>,

    next_handle: u64,
}

impl Graph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every node and edge visible in `view` into a new in-memory graph.
    pub fn from_view<V: GraphRead + ?Sized>(view: &V) -> Result<Self, FraudGraphError> {
        let mut batch = Batch::new();
        for kind in NodeKind::ALL {
            for node in view.scan(kind)? {
                batch.push_node(node);
            }
        }

        let sources: Vec<(Handle, NodeKind)> =
            batch.nodes().iter().map(|n| (n.handle, n.kind())).collect();
        for (handle, kind) in sources {
            for label in EdgeLabel::ALL.into_iter().filter(|l| l.endpoints().0 == kind) {
                for to in view.neighbors(handle, label, Direction::Forward)? {
                    batch.push_edge(Edge::new(handle, label, to));
                }
            }
        }

        let mut graph = Self::new();
        graph.apply(&batch)?;
        graph.next_handle = graph.next_handle.max(view.next_handle()?);
        Ok(graph)
    }

    /// Get all nodes in handle order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all edges in `(from, label, to)` order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.forward.iter().flat_map(|((from, label), targets)| {
            targets.iter().map(move |to| Edge::new(*from, *label, *to))
        })
    }

    /// Apply a batch: validate everything first, then mutate.
    ///
    /// Validation is the only fallible step, so a rejected batch leaves the
    /// graph untouched.
    pub fn apply(&mut self, batch: &Batch) -> Result<CommitReceipt, FraudGraphError> {
        self.validate(batch)?;

        let mut receipt = CommitReceipt::default();
        for node in batch.nodes() {
            let kind = node.kind();
            self.kind_index.entry(kind).or_default().insert(node.handle);
            self.key_index
                .entry(kind)
                .or_default()
                .insert(node.key.clone(), node.handle);
            self.next_handle = self.next_handle.max(node.handle.0.saturating_add(1));
            self.nodes.insert(node.handle, node.clone());
            receipt.nodes_written += 1;
        }

        for edge in batch.edges() {
            let fresh = self
                .forward
                .entry((edge.from, edge.label))
                .or_default()
                .insert(edge.to);
            if fresh {
                self.reverse
                    .entry((edge.to, edge.label))
                    .or_default()
                    .insert(edge.from);
                *self.label_counts.entry(edge.label).or_default() += 1;
                receipt.edges_inserted += 1;
            } else {
                receipt.edges_existing += 1;
            }
        }

        Ok(receipt)
    }

    fn validate(&self, batch: &Batch) -> Result<(), FraudGraphError> {
        let mut staged: BTreeMap<Handle, &Node> = BTreeMap::new();
        let mut staged_keys: BTreeMap<(NodeKind, &str), Handle> = BTreeMap::new();

        for node in batch.nodes() {
            let kind = node.kind();
            let existing = staged
                .get(&node.handle)
                .copied()
                .or_else(|| self.nodes.get(&node.handle));
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

            let owner = staged_keys
                .get(&(kind, node.key.as_str()))
                .copied()
                .or_else(|| self.key_owner(kind, &node.key));
            if let Some(owner) = owner.filter(|owner| *owner != node.handle) {
                return Err(FraudGraphError::Conflict(format!(
                    "{kind} key {:?} already belongs to {owner}",
                    node.key
                )));
            }

            staged.insert(node.handle, node);
            staged_keys.insert((kind, node.key.as_str()), node.handle);
        }

        for edge in batch.edges() {
            let kind_of = |handle: Handle| {
                staged
                    .get(&handle)
                    .map(|n| n.kind())
                    .or_else(|| self.nodes.get(&handle).map(Node::kind))
            };
            check_endpoints(edge, kind_of(edge.from), kind_of(edge.to))?;
        }
        Ok(())
    }

    fn key_owner(&self, kind: NodeKind, key: &str) -> Option<Handle> {
        self.key_index.get(&kind)?.get(key).copied()
    }
}

impl GraphRead for Graph {
    fn node(&self, handle: Handle) -> Result<Option<Node>, FraudGraphError> {
        Ok(self.nodes.get(&handle).cloned())
    }

    fn lookup_key(&self, kind: NodeKind, key: &str) -> Result<Option<Handle>, FraudGraphError> {
        Ok(self.key_owner(kind, key))
    }

    fn keys(&self, kind: NodeKind) -> Result<Vec<(String, Handle)>, FraudGraphError> {
        Ok(self
            .key_index
            .get(&kind)
            .into_iter()
            .flat_map(|keys| keys.iter().map(|(k, h)| (k.clone(), *h)))
            .collect())
    }

    fn next_handle(&self) -> Result<u64, FraudGraphError> {
        Ok(self.next_handle)
    }

    fn scan(&self, kind: NodeKind) -> Result<Vec<Node>, FraudGraphError> {
        Ok(self
            .kind_index
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(|handle| self.nodes.get(handle).cloned())
            .collect())
    }

    fn neighbors(
        &self,
        handle: Handle,
        label: EdgeLabel,
        direction: Direction,
    ) -> Result<Neighbors<'_>, FraudGraphError> {
        let index = match direction {
            Direction::Forward => &self.forward,
            Direction::Reverse => &self.reverse,
        };
        Ok(index
            .get(&(handle, label))
            .map_or_else(Neighbors::empty, |set| Neighbors::borrowed(set.iter())))
    }

    fn count_neighbors(
        &self,
        handle: Handle,
        label: EdgeLabel,
        direction: Direction,
    ) -> Result<usize, FraudGraphError> {
        let index = match direction {
            Direction::Forward => &self.forward,
            Direction::Reverse => &self.reverse,
        };
        Ok(index.get(&(handle, label)).map_or(0, BTreeSet::len))
    }

    fn contains_edge(&self, edge: &Edge) -> Result<bool, FraudGraphError> {
        Ok(self
            .forward
            .get(&(edge.from, edge.label))
            .is_some_and(|targets| targets.contains(&edge.to)))
    }

    fn node_count(&self) -> Result<usize, FraudGraphError> {
        Ok(self.nodes.len())
    }

    fn edge_count(&self) -> Result<usize, FraudGraphError> {
        Ok(self.label_counts.values().sum())
    }

    fn count_kind(&self, kind: NodeKind) -> Result<usize, FraudGraphError> {
        Ok(self.kind_index.get(&kind).map_or(0, BTreeSet::len))
    }

    fn count_label(&self, label: EdgeLabel) -> Result<usize, FraudGraphError> {
        Ok(self.label_counts.get(&label).copied().unwrap_or(0))
    }
}

// =============================================================================
// SHARED IN-MEMORY STORE
// =============================================================================

/// A `Graph` behind a read/write lock.
///
/// Views hold the read guard for their lifetime; a commit holds the write
/// guard for the whole batch.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: RwLock<Graph>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_graph(graph: Graph) -> Self {
        Self {
            graph: RwLock::new(graph),
        }
    }

    /// Clone of the current committed graph.
    #[must_use]
    pub fn snapshot(&self) -> Graph {
        self.graph.read().clone()
    }

    #[must_use]
    pub fn into_graph(self) -> Graph {
        self.graph.into_inner()
    }
}

impl GraphStore for MemoryStore {
    type View<'a> = MemoryView<'a>;

    fn view(&self) -> Result<MemoryView<'_>, FraudGraphError> {
        Ok(MemoryView {
            graph: self.graph.read(),
        })
    }

    fn commit(&self, batch: &Batch) -> Result<CommitReceipt, FraudGraphError> {
        self.graph.write().apply(batch)
    }
}

/// Read view over a `MemoryStore`.
#[derive(Debug)]
pub struct MemoryView<'a> {
    graph: RwLockReadGuard<'a, Graph>,
}

impl GraphRead for MemoryView<'_> {
    fn node(&self, handle: Handle) -> Result<Option<Node>, FraudGraphError> {
        self.graph.node(handle)
    }

    fn lookup_key(&self, kind: NodeKind, key: &str) -> Result<Option<Handle>, FraudGraphError> {
        self.graph.lookup_key(kind, key)
    }

    fn keys(&self, kind: NodeKind) -> Result<Vec<(String, Handle)>, FraudGraphError> {
        self.graph.keys(kind)
    }

    fn next_handle(&self) -> Result<u64, FraudGraphError> {
        self.graph.next_handle()
    }

    fn scan(&self, kind: NodeKind) -> Result<Vec<Node>, FraudGraphError> {
        self.graph.scan(kind)
    }

    fn neighbors(
        &self,
        handle: Handle,
        label: EdgeLabel,
        direction: Direction,
    ) -> Result<Neighbors<'_>, FraudGraphError> {
        self.graph.neighbors(handle, label, direction)
    }

    fn count_neighbors(
        &self,
        handle: Handle,
        label: EdgeLabel,
        direction: Direction,
    ) -> Result<usize, FraudGraphError> {
        self.graph.count_neighbors(handle, label, direction)
    }

    fn contains_edge(&self, edge: &Edge) -> Result<bool, FraudGraphError> {
        self.graph.contains_edge(edge)
    }

    fn node_count(&self) -> Result<usize, FraudGraphError> {
        self.graph.node_count()
    }

    fn edge_count(&self) -> Result<usize, FraudGraphError> {
        self.graph.edge_count()
    }

    fn count_kind(&self, kind: NodeKind) -> Result<usize, FraudGraphError> {
        self.graph.count_kind(kind)
    }

    fn count_label(&self, label: EdgeLabel) -> Result<usize, FraudGraphError> {
        self.graph.count_label(label)
    }
}

// =============================================================================
// SERIALIZATION SUPPORT
// =============================================================================

/// Serializable representation of the graph for snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub next_handle: u64,
}

impl From<&Graph> for SerializableGraph {
    fn from(graph: &Graph) -> Self {
        Self {
            nodes: graph.nodes().cloned().collect(),
            edges: graph.edges().collect(),
            next_handle: graph.next_handle,
        }
    }
}

impl TryFrom<SerializableGraph> for Graph {
    type Error = FraudGraphError;

    fn try_from(sg: SerializableGraph) -> Result<Self, Self::Error> {
        let mut batch = Batch::new();
        for node in sg.nodes {
            batch.push_node(node);
        }
        for edge in sg.edges {
            batch.push_edge(edge);
        }

        let mut graph = Graph::new();
        graph.apply(&batch)?;
        graph.next_handle = graph.next_handle.max(sg.next_handle);
        Ok(graph)
    }
}

// =============================================================================
// TESTS
// =============================================================================
