//! # Property-Based Tests
//!
//! Invariants of resolution, adjacency and traversal over generated graphs.

use fraudgraph_core::engine::money_trail;
use fraudgraph_core::{
    AccountAttrs, Batch, DeviceAttrs, Direction, Edge, EdgeLabel, Graph, GraphRead, Handle,
    MemoryStore, Node, NodeAttributes, NodeKind, Resolver, TransactionAttrs, UserAttrs,
    graph_from_bytes, graph_to_bytes,
};
use fraudgraph_core::GraphStore;
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;

// =============================================================================
// GENERATORS
// =============================================================================

/// `users` users, `devices` devices and the given `(user, device)` pairs.
fn usage_batch(users: u64, devices: u64, pairs: &[(u64, u64)]) -> Batch {
    let mut batch = Batch::new();
    for u in 0..users {
        batch.push_node(Node::new(
            Handle(u),
            format!("U{u}"),
            NodeAttributes::User(UserAttrs::default()),
        ));
    }
    for d in 0..devices {
        batch.push_node(Node::new(
            Handle(users + d),
            format!("D{d}"),
            NodeAttributes::Device(DeviceAttrs::default()),
        ));
    }
    for &(u, d) in pairs {
        batch.push_edge(Edge::new(
            Handle(u % users),
            EdgeLabel::UsesDevice,
            Handle(users + d % devices),
        ));
    }
    batch
}

/// `accounts` accounts linked by one transaction per `(from, to)` pair.
fn transfer_graph(accounts: u64, transfers: &[(u64, u64)]) -> Graph {
    let mut batch = Batch::new();
    for a in 0..accounts {
        batch.push_node(Node::new(
            Handle(a),
            format!("A{a}"),
            NodeAttributes::Account(AccountAttrs::default()),
        ));
    }
    for (i, &(from, to)) in transfers.iter().enumerate() {
        let tx = Handle(accounts + i as u64);
        batch.push_node(Node::new(
            tx,
            format!("T{i}"),
            NodeAttributes::Transaction(TransactionAttrs::default()),
        ));
        batch.push_edge(Edge::new(tx, EdgeLabel::FromAccount, Handle(from % accounts)));
        batch.push_edge(Edge::new(tx, EdgeLabel::ToAccount, Handle(to % accounts)));
    }
    let mut graph = Graph::new();
    graph.apply(&batch).expect("apply");
    graph
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Resolving the same key twice yields the same handle.
    #[test]
    fn resolve_is_idempotent(keys in vec("[A-Za-z0-9]{1,12}", 1..50)) {
        let resolver = Resolver::new();
        let first: Vec<Handle> = keys.iter().map(|k| resolver.resolve(NodeKind::User, k).handle).collect();
        let second: Vec<Handle> = keys.iter().map(|k| resolver.resolve(NodeKind::User, k).handle).collect();
        prop_assert_eq!(first, second);

        let distinct: BTreeSet<&String> = keys.iter().collect();
        prop_assert_eq!(resolver.len(NodeKind::User), distinct.len());
    }

    /// Committing the same edges twice leaves the edge count unchanged.
    #[test]
    fn edge_loading_is_idempotent(pairs in vec((0u64..20, 0u64..5), 0..80)) {
        let store = MemoryStore::new();
        let batch = usage_batch(20, 5, &pairs);

        store.commit(&batch).expect("first commit");
        let once = store.view().expect("view").edge_count().expect("count");
        let receipt = store.commit(&batch).expect("second commit");

        prop_assert_eq!(receipt.edges_inserted, 0);
        prop_assert_eq!(store.view().expect("view").edge_count().expect("count"), once);
    }

    /// Reverse `uses_device` returns exactly the users whose forward edge
    /// targets the device.
    #[test]
    fn reverse_adjacency_mirrors_forward(pairs in vec((0u64..15, 0u64..4), 0..60)) {
        let mut graph = Graph::new();
        graph.apply(&usage_batch(15, 4, &pairs)).expect("apply");

        for d in 0..4u64 {
            let device = Handle(15 + d);
            let reverse: BTreeSet<Handle> = graph
                .neighbors(device, EdgeLabel::UsesDevice, Direction::Reverse)
                .expect("neighbors")
                .collect();
            let mut forward = BTreeSet::new();
            for u in 0..15u64 {
                if graph
                    .neighbors(Handle(u), EdgeLabel::UsesDevice, Direction::Forward)
                    .expect("neighbors")
                    .any(|h| h == device)
                {
                    forward.insert(Handle(u));
                }
            }
            prop_assert_eq!(
                graph
                    .count_neighbors(device, EdgeLabel::UsesDevice, Direction::Reverse)
                    .expect("count"),
                reverse.len()
            );
            prop_assert_eq!(reverse, forward);
        }
    }

    /// Money trails never repeat a node and never exceed the requested depth.
    #[test]
    fn money_trail_is_bounded(
        transfers in vec((0u64..8, 0u64..8), 1..40),
        depth in 1usize..=3,
    ) {
        let graph = transfer_graph(8, &transfers);
        let trail = money_trail(&graph, "A0", depth)
            .expect("query")
            .expect("root exists");

        let handles: Vec<Handle> = trail.nodes.iter().map(|n| n.entity.handle()).collect();
        let unique: BTreeSet<Handle> = handles.iter().copied().collect();
        prop_assert_eq!(handles.len(), unique.len());
        prop_assert!(trail.reached_depth() <= depth);
        prop_assert_eq!(trail.steps.len() + 1, trail.nodes.len());
    }

    /// Snapshots reproduce the same graph byte for byte.
    #[test]
    fn snapshot_is_stable(transfers in vec((0u64..6, 0u64..6), 0..30)) {
        let graph = transfer_graph(6, &transfers);
        let bytes = graph_to_bytes(&graph).expect("encode");
        let restored = graph_from_bytes(&bytes).expect("decode");

        prop_assert_eq!(restored.edge_count().expect("count"), graph.edge_count().expect("count"));
        prop_assert_eq!(graph_to_bytes(&restored).expect("encode"), bytes);
    }
}
