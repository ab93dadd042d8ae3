//! # Graph Metrics
//!
//! Node and edge counts per kind and label, read from one view.

use crate::graph::GraphRead;
use crate::{EdgeLabel, FraudGraphError, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counts over one consistent state of the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    /// Kind name -> node count, every kind present.
    pub nodes_by_kind: BTreeMap<String, usize>,
    /// Label name -> edge count, every label present.
    pub edges_by_label: BTreeMap<String, usize>,
}

impl GraphMetrics {
    pub fn collect<V: GraphRead + ?Sized>(view: &V) -> Result<Self, FraudGraphError> {
        let mut nodes_by_kind = BTreeMap::new();
        for kind in NodeKind::ALL {
            nodes_by_kind.insert(kind.as_str().to_string(), view.count_kind(kind)?);
        }
        let mut edges_by_label = BTreeMap::new();
        for label in EdgeLabel::ALL {
            edges_by_label.insert(label.as_str().to_string(), view.count_label(label)?);
        }
        Ok(Self {
            node_count: view.node_count()?,
            edge_count: view.edge_count()?,
            nodes_by_kind,
            edges_by_label,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node_count == 0
    }
}
