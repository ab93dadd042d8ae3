//! # Batches
//!
//! A batch is the unit of atomic mutation: staged node upserts and edge
//! inserts that a store applies in full or not at all.

use crate::{Edge, EdgeLabel, FraudGraphError, Handle, Node, NodeKind};
use serde::{Deserialize, Serialize};

/// Staged upserts, applied in row order with nodes before edges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Batch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// What a successful commit changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Node records inserted or overwritten.
    pub nodes_written: usize,
    /// Edges that did not exist before.
    pub edges_inserted: usize,
    /// Edges that were already present (set semantics, no second copy).
    pub edges_existing: usize,
}

/// Check an edge's endpoints against its label schema.
///
/// `from_kind`/`to_kind` are the kinds currently known for the endpoints,
/// `None` when the handle has no node.
pub(crate) fn check_endpoints(
    edge: &Edge,
    from_kind: Option<NodeKind>,
    to_kind: Option<NodeKind>,
) -> Result<(), FraudGraphError> {
    let (want_from, want_to) = edge.label.endpoints();
    for (handle, expected, found) in [(edge.from, want_from, from_kind), (edge.to, want_to, to_kind)]
    {
        match found {
            None => return Err(FraudGraphError::DanglingEdge(*edge)),
            Some(found) if found != expected => {
                return Err(schema_mismatch(edge.label, handle, expected, found));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn schema_mismatch(
    label: EdgeLabel,
    handle: Handle,
    expected: NodeKind,
    found: NodeKind,
) -> FraudGraphError {
    FraudGraphError::SchemaMismatch {
        label,
        handle,
        expected,
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_checked() {
        let edge = Edge::new(Handle(1), EdgeLabel::UsesDevice, Handle(2));

        assert!(check_endpoints(&edge, Some(NodeKind::User), Some(NodeKind::Device)).is_ok());
        assert!(matches!(
            check_endpoints(&edge, Some(NodeKind::User), None),
            Err(FraudGraphError::DanglingEdge(_))
        ));
        assert!(matches!(
            check_endpoints(&edge, Some(NodeKind::Account), Some(NodeKind::Device)),
            Err(FraudGraphError::SchemaMismatch {
                expected: NodeKind::User,
                ..
            })
        ));
    }

    #[test]
    fn empty_batch() {
        let batch = Batch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }
}
